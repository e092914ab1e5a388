//! Voice activity detection.
//!
//! A four-state RMS machine over fixed 30 ms frames. Quiet audio is dropped,
//! speech is passed through, and each speech region is padded with a little
//! audio on both sides so leading and trailing consonants survive.
//!
//! The detector operates at whatever rate the samples arrive at; all of the
//! millisecond knobs are converted to sample counts against that rate.

use crate::defaults;
use crate::settings::VadSettings;

/// Configuration for the detector, copied in whenever settings change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VadConfig {
    /// When false, `process` returns its input unchanged.
    pub enabled: bool,
    /// RMS at or above this counts as speech.
    pub speech_threshold: f32,
    /// RMS below this counts as silence. Must not exceed `speech_threshold`.
    pub silence_threshold: f32,
    /// Loud audio shorter than this never becomes a speech region (ms).
    pub min_speech_ms: u32,
    /// Quiet run needed to close a speech region (ms).
    pub min_silence_ms: u32,
    /// Audio emitted before each onset (ms).
    pub pre_padding_ms: u32,
    /// Audio emitted after each offset (ms).
    pub post_padding_ms: u32,
}

impl Default for VadConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speech_threshold: defaults::VAD_SPEECH_THRESHOLD,
            silence_threshold: defaults::VAD_SILENCE_THRESHOLD,
            min_speech_ms: defaults::VAD_MIN_SPEECH_MS,
            min_silence_ms: defaults::VAD_MIN_SILENCE_MS,
            pre_padding_ms: defaults::VAD_PRE_PADDING_MS,
            post_padding_ms: defaults::VAD_POST_PADDING_MS,
        }
    }
}

impl From<VadSettings> for VadConfig {
    fn from(s: VadSettings) -> Self {
        Self {
            enabled: s.enabled,
            speech_threshold: s.speech_threshold,
            silence_threshold: s.silence_threshold,
            min_speech_ms: s.min_speech_ms,
            min_silence_ms: s.min_silence_ms,
            pre_padding_ms: s.pre_padding_ms,
            post_padding_ms: s.post_padding_ms,
        }
    }
}

/// Detector state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VadState {
    /// No speech; frames feed the pre-padding ring.
    Silence,
    /// Loud frames seen, not yet enough to commit.
    SpeechOnset,
    /// Committed speech region; frames pass through.
    Speaking,
    /// Quiet frames seen during speech, not yet enough to close.
    SpeechOffset,
}

/// Streaming voice activity detector.
pub struct VoiceActivityDetector {
    config: VadConfig,
    state: VadState,
    is_speaking: bool,
    active_sample_rate: u32,
    pre_speech: Vec<f32>,
    onset: Vec<f32>,
    post_speech: Vec<f32>,
    speech_samples: usize,
    silence_samples: usize,
}

impl VoiceActivityDetector {
    pub fn new(config: VadConfig) -> Self {
        Self {
            config,
            state: VadState::Silence,
            is_speaking: false,
            active_sample_rate: defaults::SAMPLE_RATE,
            pre_speech: Vec::new(),
            onset: Vec::new(),
            post_speech: Vec::new(),
            speech_samples: 0,
            silence_samples: 0,
        }
    }

    /// Current state.
    pub fn state(&self) -> VadState {
        self.state
    }

    /// True while inside a committed speech region (including its offset
    /// grace period, until the offset commits back to silence).
    pub fn is_speaking(&self) -> bool {
        self.is_speaking
    }

    /// Replace the configuration without touching buffered state.
    pub fn set_config(&mut self, config: VadConfig) {
        self.config = config;
    }

    pub fn config(&self) -> VadConfig {
        self.config
    }

    /// Clear all buffered audio and counters and return to silence.
    pub fn reset(&mut self) {
        self.state = VadState::Silence;
        self.is_speaking = false;
        self.pre_speech.clear();
        self.onset.clear();
        self.post_speech.clear();
        self.speech_samples = 0;
        self.silence_samples = 0;
    }

    /// Run samples through the detector, returning the gated output.
    ///
    /// Output preserves sample order: samples are only dropped (silence) or
    /// prefixed with previously-buffered padding, never reordered or scaled.
    /// The tail frame of a call may be shorter than 30 ms and is processed
    /// with its true length. Never fails; all-zero or saturated input yields
    /// deterministic output.
    pub fn process(&mut self, samples: &[f32], sample_rate: u32) -> Vec<f32> {
        if !self.config.enabled {
            return samples.to_vec();
        }

        self.active_sample_rate = sample_rate;
        let frame_size = (sample_rate * defaults::VAD_FRAME_MS / 1000) as usize;
        let frame_size = frame_size.max(1);

        let mut output = Vec::new();
        for frame in samples.chunks(frame_size) {
            self.process_frame(frame, &mut output);
        }
        output
    }

    fn ms_to_samples(&self, ms: u32) -> usize {
        (ms as u64 * self.active_sample_rate as u64 / 1000) as usize
    }

    fn process_frame(&mut self, frame: &[f32], output: &mut Vec<f32>) {
        let rms = compute_rms(frame);

        match self.state {
            VadState::Silence => {
                if rms >= self.config.speech_threshold {
                    self.state = VadState::SpeechOnset;
                    self.speech_samples = frame.len();
                    self.onset.clear();
                    self.onset.extend_from_slice(frame);
                } else {
                    self.append_to_pre_speech(frame);
                }
            }

            VadState::SpeechOnset => {
                if rms >= self.config.speech_threshold {
                    self.speech_samples += frame.len();
                    self.onset.extend_from_slice(frame);

                    if self.speech_samples >= self.ms_to_samples(self.config.min_speech_ms) {
                        self.state = VadState::Speaking;
                        self.is_speaking = true;
                        output.extend_from_slice(&self.pre_speech);
                        output.extend_from_slice(&self.onset);
                        self.pre_speech.clear();
                        self.onset.clear();
                    }
                } else {
                    // Too short to be speech: demote the onset back into the
                    // pre-padding ring so a real onset still gets its lead-in.
                    let onset = std::mem::take(&mut self.onset);
                    self.append_to_pre_speech(&onset);
                    self.append_to_pre_speech(frame);
                    self.speech_samples = 0;
                    self.state = VadState::Silence;
                }
            }

            VadState::Speaking => {
                if rms < self.config.silence_threshold {
                    self.state = VadState::SpeechOffset;
                    self.silence_samples = frame.len();
                    self.post_speech.clear();
                    self.post_speech.extend_from_slice(frame);
                } else {
                    output.extend_from_slice(frame);
                }
            }

            VadState::SpeechOffset => {
                if rms < self.config.silence_threshold {
                    self.silence_samples += frame.len();
                    self.post_speech.extend_from_slice(frame);

                    if self.silence_samples >= self.ms_to_samples(self.config.min_silence_ms) {
                        let padding = self
                            .ms_to_samples(self.config.post_padding_ms)
                            .min(self.post_speech.len());
                        output.extend_from_slice(&self.post_speech[..padding]);
                        self.post_speech.clear();
                        self.silence_samples = 0;
                        self.state = VadState::Silence;
                        self.is_speaking = false;
                        self.pre_speech.clear();
                    }
                } else {
                    // Speech resumed: the buffered quiet was a mid-utterance
                    // dip, keep all of it.
                    output.extend_from_slice(&self.post_speech);
                    output.extend_from_slice(frame);
                    self.post_speech.clear();
                    self.silence_samples = 0;
                    self.state = VadState::Speaking;
                }
            }
        }
    }

    /// The pre-padding ring is bounded in samples; oldest samples fall off
    /// the head.
    fn append_to_pre_speech(&mut self, data: &[f32]) {
        self.pre_speech.extend_from_slice(data);
        let max = self.ms_to_samples(self.config.pre_padding_ms);
        if self.pre_speech.len() > max {
            let excess = self.pre_speech.len() - max;
            self.pre_speech.drain(..excess);
        }
    }
}

/// Root-mean-square amplitude of a frame, 0.0 for an empty frame.
pub fn compute_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum_sq: f32 = samples.iter().map(|&s| s * s).sum();
    (sum_sq / samples.len() as f32).sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    const RATE: u32 = 16_000;
    const FRAME: usize = 480; // 30ms at 16kHz

    fn loud(count: usize) -> Vec<f32> {
        vec![0.05; count]
    }

    fn quiet(count: usize) -> Vec<f32> {
        vec![0.0; count]
    }

    fn test_config() -> VadConfig {
        VadConfig {
            enabled: true,
            speech_threshold: 0.007,
            silence_threshold: 0.003,
            min_speech_ms: 30,
            min_silence_ms: 600,
            pre_padding_ms: 200,
            post_padding_ms: 300,
        }
    }

    #[test]
    fn rms_of_silence_is_zero() {
        assert_eq!(compute_rms(&quiet(1000)), 0.0);
    }

    #[test]
    fn rms_of_empty_is_zero() {
        assert_eq!(compute_rms(&[]), 0.0);
    }

    #[test]
    fn rms_of_constant_signal() {
        let rms = compute_rms(&loud(1000));
        assert!((rms - 0.05).abs() < 1e-6);
    }

    #[test]
    fn disabled_passes_input_through() {
        let mut vad = VoiceActivityDetector::new(VadConfig {
            enabled: false,
            ..test_config()
        });
        let input: Vec<f32> = (0..1000).map(|i| (i as f32) * 1e-4).collect();
        assert_eq!(vad.process(&input, RATE), input);
    }

    #[test]
    fn pure_silence_emits_nothing() {
        let mut vad = VoiceActivityDetector::new(test_config());
        let out = vad.process(&quiet(RATE as usize * 2), RATE);
        assert!(out.is_empty());
        assert_eq!(vad.state(), VadState::Silence);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn speech_commits_with_pre_padding() {
        let mut vad = VoiceActivityDetector::new(test_config());

        // 1s of silence fills the pre-pad ring (capped at 200ms = 3200 samples)
        let out = vad.process(&quiet(RATE as usize), RATE);
        assert!(out.is_empty());

        // First loud frame seeds the onset; the second commits it
        let out = vad.process(&loud(FRAME * 2), RATE);
        assert_eq!(vad.state(), VadState::Speaking);
        assert!(vad.is_speaking());

        // Output = 200ms pre-pad + both onset frames
        assert_eq!(out.len(), 3200 + FRAME * 2);
        assert!(out[..3200].iter().all(|&s| s == 0.0));
        assert!(out[3200..].iter().all(|&s| s == 0.05));
    }

    #[test]
    fn short_blip_is_demoted_not_emitted() {
        let config = VadConfig {
            min_speech_ms: 90, // needs 3 loud frames
            ..test_config()
        };
        let mut vad = VoiceActivityDetector::new(config);

        let out = vad.process(&loud(FRAME), RATE);
        assert!(out.is_empty());
        assert_eq!(vad.state(), VadState::SpeechOnset);

        // Quiet frame demotes the onset back to silence
        let out = vad.process(&quiet(FRAME), RATE);
        assert!(out.is_empty());
        assert_eq!(vad.state(), VadState::Silence);
        assert!(!vad.is_speaking());
    }

    #[test]
    fn demoted_onset_spills_into_pre_padding() {
        let config = VadConfig {
            min_speech_ms: 90,
            pre_padding_ms: 200,
            ..test_config()
        };
        let mut vad = VoiceActivityDetector::new(config);

        // Blip then quiet: blip audio lands in the pre-pad ring
        vad.process(&loud(FRAME), RATE);
        vad.process(&quiet(FRAME), RATE);

        // Real speech: pre-pad flush must include the demoted blip samples
        let out = vad.process(&loud(FRAME * 3), RATE);
        assert_eq!(vad.state(), VadState::Speaking);
        assert!(
            out.iter().take(FRAME * 2).any(|&s| s == 0.05),
            "demoted onset samples missing from pre-padding"
        );
    }

    #[test]
    fn offset_commits_with_capped_post_padding() {
        let mut vad = VoiceActivityDetector::new(test_config());

        // Enter speech
        vad.process(&loud(FRAME * 4), RATE);
        assert!(vad.is_speaking());

        // 600ms of quiet closes the region; post-pad capped at 300ms = 4800
        let out = vad.process(&quiet(RATE as usize), RATE);
        assert_eq!(vad.state(), VadState::Silence);
        assert!(!vad.is_speaking());
        assert_eq!(out.len(), 4800);
    }

    #[test]
    fn is_speaking_stable_across_offset_grace() {
        let mut vad = VoiceActivityDetector::new(test_config());
        vad.process(&loud(FRAME * 4), RATE);

        // 300ms of quiet: not yet min_silence_ms, still "speaking"
        vad.process(&quiet(FRAME * 10), RATE);
        assert_eq!(vad.state(), VadState::SpeechOffset);
        assert!(vad.is_speaking());
    }

    #[test]
    fn offset_resume_keeps_buffered_quiet_audio() {
        let mut vad = VoiceActivityDetector::new(test_config());
        vad.process(&loud(FRAME * 4), RATE);

        // Short dip, then speech resumes
        let dip = vad.process(&quiet(FRAME * 2), RATE);
        assert!(dip.is_empty());
        let out = vad.process(&loud(FRAME), RATE);

        // The dip plus the resuming frame are emitted together
        assert_eq!(out.len(), FRAME * 3);
        assert_eq!(vad.state(), VadState::Speaking);
    }

    #[test]
    fn pre_padding_ring_is_sample_bounded() {
        let config = VadConfig {
            pre_padding_ms: 100, // 1600 samples at 16kHz
            ..test_config()
        };
        let mut vad = VoiceActivityDetector::new(config);

        // Feed ramp silence so we can see which samples survive
        let ramp: Vec<f32> = (0..RATE as usize).map(|i| i as f32 * 1e-9).collect();
        vad.process(&ramp, RATE);

        let out = vad.process(&loud(FRAME * 2), RATE);
        // pre-pad (1600) + both onset frames
        assert_eq!(out.len(), 1600 + FRAME * 2);
        // The surviving pre-pad is the newest silence, i.e. the ramp's tail
        assert_eq!(out[0], ramp[ramp.len() - 1600]);
    }

    #[test]
    fn output_never_exceeds_input_plus_prepad() {
        let mut vad = VoiceActivityDetector::new(test_config());
        let mut total_in = 0usize;
        let mut total_out = 0usize;

        for i in 0..100 {
            let chunk: Vec<f32> = if i % 3 == 0 { loud(FRAME) } else { quiet(FRAME) };
            total_in += chunk.len();
            total_out += vad.process(&chunk, RATE).len();
        }

        let prepad = 200 * RATE as usize / 1000;
        assert!(total_out <= total_in + prepad);
    }

    #[test]
    fn reset_returns_to_silence() {
        let mut vad = VoiceActivityDetector::new(test_config());
        vad.process(&loud(FRAME * 4), RATE);
        assert!(vad.is_speaking());

        vad.reset();
        assert_eq!(vad.state(), VadState::Silence);
        assert!(!vad.is_speaking());

        // Post-reset the pre-pad ring is empty: the next commit emits only
        // the onset audio.
        let out = vad.process(&loud(FRAME * 2), RATE);
        assert_eq!(out.len(), FRAME * 2);
    }

    #[test]
    fn short_tail_frame_is_processed() {
        let mut vad = VoiceActivityDetector::new(test_config());
        // 4 full frames plus a 100-sample tail, all loud
        let out = vad.process(&loud(FRAME * 4 + 100), RATE);
        assert_eq!(out.len(), FRAME * 4 + 100);
    }

    #[test]
    fn works_at_48khz() {
        let mut vad = VoiceActivityDetector::new(test_config());
        let frame_48k = 1440; // 30ms at 48kHz

        vad.process(&quiet(48_000), 48_000);
        let out = vad.process(&loud(frame_48k * 2), 48_000);

        // 200ms pre-pad at 48kHz = 9600 samples
        assert_eq!(out.len(), 9600 + frame_48k * 2);
        assert!(vad.is_speaking());
    }

    #[test]
    fn set_config_keeps_state() {
        let mut vad = VoiceActivityDetector::new(test_config());
        vad.process(&loud(FRAME * 4), RATE);
        assert!(vad.is_speaking());

        vad.set_config(VadConfig {
            speech_threshold: 0.02,
            ..test_config()
        });
        assert!(vad.is_speaking(), "set_config must not reset state");
    }
}
