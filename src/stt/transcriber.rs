//! The transcription seam.
//!
//! The pipeline only knows this trait; the Whisper engine lives behind it,
//! and tests substitute a scripted mock.

use crate::error::{HoldspeakError, Result};
use std::sync::{Arc, Mutex};

/// One decoded segment of speech.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscriptionSegment {
    pub text: String,
    /// Segment start, milliseconds from the start of the buffer.
    pub start_ms: i64,
    /// Segment end, milliseconds from the start of the buffer.
    pub end_ms: i64,
    /// Probability that the segment contains no speech, where the engine
    /// reports one.
    pub no_speech_prob: Option<f32>,
    /// Mean token probability across the segment, where available.
    pub avg_token_prob: Option<f32>,
}

impl TranscriptionSegment {
    pub fn new(text: impl Into<String>, start_ms: i64, end_ms: i64) -> Self {
        Self {
            text: text.into(),
            start_ms,
            end_ms,
            no_speech_prob: None,
            avg_token_prob: None,
        }
    }

    /// True for segments that are probably silence the model narrated over:
    /// confident about "no speech" and unconfident about its own tokens.
    pub fn is_low_confidence(&self) -> bool {
        matches!(
            (self.no_speech_prob, self.avg_token_prob),
            (Some(ns), Some(tp)) if ns > 0.60 && tp < 0.30
        )
    }
}

/// The outcome of one transcribe call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TranscriptionResult {
    pub segments: Vec<TranscriptionSegment>,
    pub audio_duration_ms: f64,
    pub transcription_time_ms: f64,
    pub model_name: String,
}

impl TranscriptionResult {
    /// All segment text joined, untrimmed.
    pub fn full_text(&self) -> String {
        self.segments.iter().map(|s| s.text.as_str()).collect()
    }

    /// Segment text joined with low-confidence segments dropped, trimmed.
    pub fn filtered_text(&self) -> String {
        self.segments
            .iter()
            .filter(|s| !s.is_low_confidence())
            .map(|s| s.text.as_str())
            .collect::<String>()
            .trim()
            .to_string()
    }

    /// Wall-clock time over audio time; < 1 is faster than real time.
    pub fn real_time_factor(&self) -> f64 {
        if self.audio_duration_ms <= 0.0 {
            return 0.0;
        }
        self.transcription_time_ms / self.audio_duration_ms
    }
}

/// Trait over the speech engine.
///
/// Implementations take 16 kHz mono f32 audio and may receive the rolling
/// context as an initial prompt. One call runs at a time; implementations
/// serialize internally.
pub trait Transcriber: Send + Sync {
    /// Transcribe a buffer, optionally primed with prior context.
    fn transcribe(
        &self,
        samples: &[f32],
        context_prompt: Option<&str>,
    ) -> Result<TranscriptionResult>;

    /// Name of the loaded model.
    fn model_name(&self) -> &str;

    /// Run a throwaway call on one second of silence to force kernel
    /// compilation and memory pinning before the first real recording.
    fn warmup(&self) {
        let silence = vec![0.0f32; crate::defaults::SAMPLE_RATE as usize];
        let _ = self.transcribe(&silence, None);
    }
}

impl<T: Transcriber + ?Sized> Transcriber for Arc<T> {
    fn transcribe(
        &self,
        samples: &[f32],
        context_prompt: Option<&str>,
    ) -> Result<TranscriptionResult> {
        (**self).transcribe(samples, context_prompt)
    }

    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn warmup(&self) {
        (**self).warmup()
    }
}

/// A recorded call made against [`MockTranscriber`].
#[derive(Debug, Clone, PartialEq)]
pub struct MockCall {
    pub sample_count: usize,
    pub context_prompt: Option<String>,
}

/// Scripted transcriber for tests.
///
/// Responses are played back in order; once exhausted, the last response
/// repeats. Every call is recorded for later inspection.
#[derive(Clone)]
pub struct MockTranscriber {
    model_name: String,
    responses: Arc<Mutex<Vec<TranscriptionResult>>>,
    calls: Arc<Mutex<Vec<MockCall>>>,
    should_fail: bool,
}

impl MockTranscriber {
    pub fn new(model_name: &str) -> Self {
        Self {
            model_name: model_name.to_string(),
            responses: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            should_fail: false,
        }
    }

    /// Queue a plain-text response (one segment spanning the whole buffer).
    pub fn with_response(self, text: &str) -> Self {
        self.push_response(TranscriptionResult {
            segments: vec![TranscriptionSegment::new(text, 0, 1000)],
            audio_duration_ms: 1000.0,
            transcription_time_ms: 10.0,
            model_name: self.model_name.clone(),
        });
        self
    }

    /// Queue a fully-specified response.
    pub fn with_result(self, result: TranscriptionResult) -> Self {
        self.push_response(result);
        self
    }

    /// Make every call fail.
    pub fn with_failure(mut self) -> Self {
        self.should_fail = true;
        self
    }

    fn push_response(&self, result: TranscriptionResult) {
        self.responses
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(result);
    }

    /// All calls made so far.
    pub fn calls(&self) -> Vec<MockCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Transcriber for MockTranscriber {
    fn transcribe(
        &self,
        samples: &[f32],
        context_prompt: Option<&str>,
    ) -> Result<TranscriptionResult> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(MockCall {
                sample_count: samples.len(),
                context_prompt: context_prompt.map(str::to_string),
            });

        if self.should_fail {
            return Err(HoldspeakError::Transcription {
                message: "mock transcription failure".to_string(),
            });
        }

        let mut responses = self.responses.lock().unwrap_or_else(|e| e.into_inner());
        let result = if responses.len() > 1 {
            responses.remove(0)
        } else if let Some(last) = responses.first() {
            last.clone()
        } else {
            TranscriptionResult {
                segments: Vec::new(),
                audio_duration_ms: samples.len() as f64 / 16.0,
                transcription_time_ms: 1.0,
                model_name: self.model_name.clone(),
            }
        };
        Ok(result)
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}
