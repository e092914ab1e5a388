//! The transcription pipeline controller.
//!
//! Owns the capture stage, the loaded model, the rolling context, and the
//! output dispatch. Two modes:
//!
//! - **Buffered**: audio accumulates while the key is held; one
//!   transcription runs on release.
//! - **Continuous**: a monitor thread watches for pauses while the key stays
//!   held and emits text after each one, feeding earlier output back to the
//!   model as context.

pub mod perf;

use crate::audio::capture::{AudioCapture, CaptureShared};
use crate::defaults;
use crate::error::{HoldspeakError, Result};
use crate::input::injector::TextInjector;
use crate::models::{ModelManager, WhisperModel};
use crate::pipeline::perf::PerformanceMonitor;
use crate::settings::{OutputMode, Settings, TranscriptionMode};
use crate::stt::transcriber::{Transcriber, TranscriptionResult};
use crate::stt::whisper::WhisperTranscriber;
use crate::text::chunker::transcribe_chunked;
use crate::text::hallucination;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};
use std::thread::JoinHandle;
use std::time::Duration;

pub struct Pipeline {
    capture: Mutex<AudioCapture>,
    shared: Arc<CaptureShared>,
    transcriber: Mutex<Option<Arc<dyn Transcriber>>>,
    /// Held for the duration of each transcribe call; this is the
    /// single-flight guarantee.
    transcribe_gate: Mutex<()>,
    injector: Box<dyn TextInjector>,
    settings: Mutex<Settings>,
    models: Mutex<ModelManager>,
    perf: Mutex<PerformanceMonitor>,

    recording: AtomicBool,
    transcribing: AtomicBool,
    did_output: AtomicBool,
    last_context: Mutex<String>,
    silence_ticks: AtomicU32,

    monitor_running: Arc<AtomicBool>,
    monitor_handle: Mutex<Option<JoinHandle<()>>>,
    /// Self-reference so the monitor thread can hold the pipeline alive.
    self_ref: Mutex<Weak<Pipeline>>,

    verbosity: u8,
}

impl Pipeline {
    /// Build a pipeline around an already-constructed capture stage.
    pub fn new(
        capture: AudioCapture,
        injector: Box<dyn TextInjector>,
        settings: Settings,
        verbosity: u8,
    ) -> Arc<Self> {
        let shared = capture.shared();
        let pipeline = Arc::new(Self {
            capture: Mutex::new(capture),
            shared,
            transcriber: Mutex::new(None),
            transcribe_gate: Mutex::new(()),
            injector,
            settings: Mutex::new(settings),
            models: Mutex::new(ModelManager::new()),
            perf: Mutex::new(PerformanceMonitor::new()),
            recording: AtomicBool::new(false),
            transcribing: AtomicBool::new(false),
            did_output: AtomicBool::new(false),
            last_context: Mutex::new(String::new()),
            silence_ticks: AtomicU32::new(0),
            monitor_running: Arc::new(AtomicBool::new(false)),
            monitor_handle: Mutex::new(None),
            self_ref: Mutex::new(Weak::new()),
            verbosity,
        });
        *pipeline
            .self_ref
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Arc::downgrade(&pipeline);
        pipeline.apply_vad_settings();
        pipeline
    }

    // ── State queries ───────────────────────────────────────────────────

    pub fn is_recording(&self) -> bool {
        self.recording.load(Ordering::Relaxed)
    }

    pub fn is_transcribing(&self) -> bool {
        self.transcribing.load(Ordering::Relaxed)
    }

    pub fn did_output_text(&self) -> bool {
        self.did_output.load(Ordering::Relaxed)
    }

    /// Latest microphone level for meters.
    pub fn audio_level(&self) -> f32 {
        self.shared.audio_level()
    }

    /// The capture data path, for hosts that feed audio themselves.
    pub fn capture_shared(&self) -> Arc<CaptureShared> {
        Arc::clone(&self.shared)
    }

    pub fn settings(&self) -> Settings {
        self.settings.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Replace settings and re-derive the VAD configuration.
    pub fn update_settings(&self, settings: Settings) {
        *self.settings.lock().unwrap_or_else(|e| e.into_inner()) = settings;
        self.apply_vad_settings();
    }

    /// Copy the settings' VAD block and input gain into the capture stage.
    /// Idempotent: applying the same settings twice is a no-op.
    pub fn apply_vad_settings(&self) {
        let settings = self.settings();
        self.shared.set_vad_config(settings.vad.into());
        self.shared.set_gain(settings.input_gain);
    }

    pub fn with_perf<R>(&self, f: impl FnOnce(&PerformanceMonitor) -> R) -> R {
        let perf = self.perf.lock().unwrap_or_else(|e| e.into_inner());
        f(&perf)
    }

    pub fn with_models<R>(&self, f: impl FnOnce(&mut ModelManager) -> R) -> R {
        let mut models = self.models.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut models)
    }

    // ── Model loading ───────────────────────────────────────────────────

    /// Load a model, warm it up, and make it the active transcriber.
    ///
    /// On failure the previous transcriber (if any) stays active.
    pub fn load_model(&self, model: &WhisperModel) -> Result<()> {
        let settings = self.settings();
        let transcriber = WhisperTranscriber::new(&model.path, &settings)?;
        transcriber.warmup();

        *self.transcriber.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Arc::new(transcriber));
        self.with_models(|m| m.set_current(model.clone()));
        {
            let mut settings = self.settings.lock().unwrap_or_else(|e| e.into_inner());
            settings.model = model.id.clone();
        }
        if self.verbosity >= 1 {
            eprintln!("holdspeak: model loaded and warmed up: {}", model.name());
        }
        Ok(())
    }

    /// Scan the models directory and load the saved model, or the first one
    /// found.
    pub fn load_first_available(&self) -> Result<()> {
        let saved = self.settings().model;
        let model = self.with_models(|m| {
            m.scan();
            m.saved_or_first(&saved).cloned()
        });
        match model {
            Some(model) => self.load_model(&model),
            None => Err(HoldspeakError::Other(format!(
                "No models found in {}",
                ModelManager::models_directory().display()
            ))),
        }
    }

    /// Install a transcriber directly, bypassing model files. Hosts and
    /// tests use this to supply their own engine.
    pub fn set_transcriber(&self, transcriber: Arc<dyn Transcriber>) {
        *self.transcriber.lock().unwrap_or_else(|e| e.into_inner()) = Some(transcriber);
    }

    pub fn has_transcriber(&self) -> bool {
        self.transcriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .is_some()
    }

    fn current_transcriber(&self) -> Option<Arc<dyn Transcriber>> {
        self.transcriber
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ── Recording lifecycle ─────────────────────────────────────────────

    /// Start capturing. In continuous mode this also spawns the monitor.
    pub fn start_recording(&self) -> Result<()> {
        if self.recording.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.last_context
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        self.did_output.store(false, Ordering::Relaxed);

        {
            let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
            if let Err(e) = capture.start_recording() {
                self.recording.store(false, Ordering::SeqCst);
                return Err(e);
            }
        }

        if self.settings().transcription_mode == TranscriptionMode::Continuous {
            self.start_monitor();
        }
        Ok(())
    }

    /// Stop capturing and run the final transcription.
    ///
    /// Returns None when nothing was recorded, the buffer is shorter than
    /// [`defaults::MIN_SAMPLES`], or transcription produced nothing.
    pub fn stop_recording_and_transcribe(&self) -> Option<TranscriptionResult> {
        if !self.recording.load(Ordering::SeqCst) {
            return None;
        }

        self.stop_monitor();

        let samples = {
            let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
            let samples = capture.stop_recording();
            if !self.settings().keep_mic_warm {
                capture.release();
            }
            samples
        };
        self.recording.store(false, Ordering::SeqCst);

        if samples.len() < defaults::MIN_SAMPLES {
            return None;
        }

        self.transcribe_and_output(&samples)
    }

    /// Open the capture device ahead of time (mic-warm on).
    pub fn prepare_capture(&self) -> Result<()> {
        let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        capture.prepare()
    }

    /// Close the capture device (mic-warm off).
    pub fn release_capture(&self) {
        let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
        capture.release();
    }

    /// Stop everything and drop the model.
    pub fn shutdown(&self) {
        self.stop_monitor();
        {
            let mut capture = self.capture.lock().unwrap_or_else(|e| e.into_inner());
            capture.release();
        }
        self.recording.store(false, Ordering::SeqCst);
        // Wait out any in-flight transcription before dropping the model
        let _gate = self.transcribe_gate.lock().unwrap_or_else(|e| e.into_inner());
        *self.transcriber.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    // ── Buffered path ───────────────────────────────────────────────────

    fn transcribe_and_output(&self, samples: &[f32]) -> Option<TranscriptionResult> {
        let transcriber = self.current_transcriber()?;

        self.transcribing.store(true, Ordering::SeqCst);
        let result = {
            let _gate = self.transcribe_gate.lock().unwrap_or_else(|e| e.into_inner());
            if samples.len() > defaults::MAX_CHUNK_SAMPLES {
                transcribe_chunked(samples, transcriber.as_ref())
            } else {
                transcriber.transcribe(samples, None)
            }
        };
        self.transcribing.store(false, Ordering::SeqCst);

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!("holdspeak: transcription failed: {}", e);
                return None;
            }
        };

        self.perf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&result);

        if self.verbosity >= 1 {
            eprintln!(
                "holdspeak: transcribed {:.1}s in {:.0}ms (RTF {:.2})",
                result.audio_duration_ms / 1000.0,
                result.transcription_time_ms,
                result.real_time_factor()
            );
        }

        let text = result.filtered_text();
        if !text.is_empty() && !hallucination::is_hallucination(&text) {
            self.output_text(&text);
        } else if !text.is_empty() && self.verbosity >= 2 {
            eprintln!("holdspeak: filtered hallucination: {:?}", text);
        }

        Some(result)
    }

    fn output_text(&self, text: &str) {
        self.did_output.store(true, Ordering::SeqCst);
        let settings = self.settings();
        let dispatch = match settings.output_mode {
            OutputMode::Type => self.injector.type_text(text, settings.type_speed_ms),
            OutputMode::Paste => self
                .injector
                .paste_text(text, settings.restore_clipboard),
        };
        if let Err(e) = dispatch {
            // The transcription is lost but the pipeline stays healthy
            eprintln!("holdspeak: {}", e);
        }
    }

    /// Send a Return keystroke (the talk+send hotkey's trailing newline).
    pub fn press_return(&self) {
        if let Err(e) = self.injector.press_return() {
            eprintln!("holdspeak: {}", e);
        }
    }

    // ── Continuous path ─────────────────────────────────────────────────

    fn start_monitor(&self) {
        let Some(pipeline) = self
            .self_ref
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .upgrade()
        else {
            return;
        };

        self.silence_ticks.store(0, Ordering::Relaxed);
        self.monitor_running.store(true, Ordering::SeqCst);

        let running = Arc::clone(&self.monitor_running);
        let handle = std::thread::spawn(move || {
            while running.load(Ordering::SeqCst) {
                std::thread::sleep(Duration::from_millis(defaults::MONITOR_TICK_MS));
                if !running.load(Ordering::SeqCst) {
                    break;
                }
                pipeline.monitor_tick();
            }
        });

        *self
            .monitor_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner()) = Some(handle);
    }

    /// Stop the continuous monitor thread without ending the recording.
    /// Hosts that call [`Pipeline::monitor_tick`] themselves use this to
    /// take over the tick cadence.
    pub fn stop_monitor(&self) {
        self.monitor_running.store(false, Ordering::SeqCst);
        let handle = self
            .monitor_handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        if let Some(handle) = handle {
            let _ = handle.join();
        }
    }

    /// One continuous-mode monitor pass.
    ///
    /// Returns true when a transcription ran. Called from the monitor thread
    /// every 150 ms; exposed so tests can drive ticks directly.
    pub fn monitor_tick(&self) -> bool {
        if self.shared.is_speaking() {
            self.silence_ticks.store(0, Ordering::Relaxed);
        } else {
            self.silence_ticks.fetch_add(1, Ordering::Relaxed);
        }

        let buffered = self.shared.buffered_count();
        let source_rate = self.shared.source_rate() as usize;

        let pause_detected =
            buffered > 0 && self.silence_ticks.load(Ordering::Relaxed) >= defaults::PAUSE_TICKS;
        let buffer_full = buffered > source_rate * defaults::BUFFER_FULL_SECS;

        if (!pause_detected && !buffer_full) || self.transcribing.load(Ordering::SeqCst) {
            return false;
        }

        // Not enough audio to bother the model with yet
        let min_raw = defaults::CONTINUOUS_MIN_SAMPLES * source_rate
            / defaults::SAMPLE_RATE as usize;
        if buffered < min_raw {
            return false;
        }

        let Some(transcriber) = self.current_transcriber() else {
            return false;
        };

        let raw = self.shared.drain_raw();
        let resampled = self.shared.resample_to_target(&raw);
        if resampled.len() < defaults::CONTINUOUS_MIN_SAMPLES {
            return false;
        }

        let prompt = {
            let context = self.last_context.lock().unwrap_or_else(|e| e.into_inner());
            if context.is_empty() {
                None
            } else {
                Some(tail_chars(&context, defaults::CONTEXT_PROMPT_CHARS))
            }
        };

        self.transcribing.store(true, Ordering::SeqCst);
        let result = {
            let _gate = self.transcribe_gate.lock().unwrap_or_else(|e| e.into_inner());
            transcriber.transcribe(&resampled, prompt.as_deref())
        };
        self.transcribing.store(false, Ordering::SeqCst);

        let result = match result {
            Ok(r) => r,
            Err(e) => {
                eprintln!("holdspeak: transcription failed: {}", e);
                return true;
            }
        };

        let text = result.filtered_text();
        if text.is_empty() {
            return true;
        }

        {
            let context = self.last_context.lock().unwrap_or_else(|e| e.into_inner());
            if !hallucination::accepts_with_context(&text, &context) {
                if self.verbosity >= 2 {
                    eprintln!("holdspeak: filtered hallucination: {:?}", text);
                }
                return true;
            }
        }

        {
            let mut context = self.last_context.lock().unwrap_or_else(|e| e.into_inner());
            context.push(' ');
            context.push_str(&text);
            if context.chars().count() > defaults::CONTEXT_MAX_CHARS {
                *context = tail_chars(&context, defaults::CONTEXT_KEEP_CHARS);
            }
        }

        self.perf
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .record(&result);

        if self.verbosity >= 1 {
            eprintln!(
                "holdspeak: continuous segment, {} chars ({:.0}ms, RTF {:.2})",
                text.chars().count(),
                result.transcription_time_ms,
                result.real_time_factor()
            );
        }

        self.output_text(&format!("{} ", text));
        true
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.monitor_running.store(false, Ordering::SeqCst);
    }
}

/// Last `max` chars of a string, on a char boundary.
fn tail_chars(text: &str, max: usize) -> String {
    let count = text.chars().count();
    if count <= max {
        return text.to_string();
    }
    text.chars().skip(count - max).collect()
}
