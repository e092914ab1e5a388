//! Shared constants for holdspeak.
//!
//! Single home for the magic numbers the audio path, pipeline, and settings
//! all agree on.

/// Target sample rate for transcription in Hz.
///
/// Whisper models are trained on 16 kHz mono audio; everything captured at
/// the hardware rate is resampled down to this before inference.
pub const SAMPLE_RATE: u32 = 16_000;

/// VAD analysis frame length in milliseconds.
pub const VAD_FRAME_MS: u32 = 30;

/// Default RMS threshold above which a frame counts as speech.
pub const VAD_SPEECH_THRESHOLD: f32 = 0.007;

/// Default RMS threshold below which a frame counts as silence.
///
/// Kept below the speech threshold so the state machine has hysteresis:
/// a frame between the two extends whatever state it is in.
pub const VAD_SILENCE_THRESHOLD: f32 = 0.003;

/// Default minimum run of loud frames before speech is committed (ms).
pub const VAD_MIN_SPEECH_MS: u32 = 30;

/// Default run of quiet frames before a speech region is closed (ms).
pub const VAD_MIN_SILENCE_MS: u32 = 600;

/// Audio retained before a detected speech onset (ms).
pub const VAD_PRE_PADDING_MS: u32 = 200;

/// Audio retained after a detected speech offset (ms).
pub const VAD_POST_PADDING_MS: u32 = 300;

/// Shortest buffer worth transcribing: 0.5 s at 16 kHz.
pub const MIN_SAMPLES: usize = 8_000;

/// Longest buffer fed to the model in one call: 30 s at 16 kHz.
/// Anything longer goes through the chunker.
pub const MAX_CHUNK_SAMPLES: usize = 480_000;

/// Overlap carried between consecutive chunks: 1.5 s at 16 kHz.
pub const CHUNK_OVERLAP_SAMPLES: usize = 24_000;

/// Shortest segment the continuous monitor will transcribe: 1.5 s at 16 kHz.
pub const CONTINUOUS_MIN_SAMPLES: usize = 24_000;

/// Continuous monitor wake interval in milliseconds.
pub const MONITOR_TICK_MS: u64 = 150;

/// Consecutive quiet monitor ticks that count as a pause (~450 ms).
pub const PAUSE_TICKS: u32 = 3;

/// Continuous mode force-flushes once this much raw audio is buffered (s).
pub const BUFFER_FULL_SECS: usize = 25;

/// Rolling context is truncated to this many chars once it exceeds
/// [`CONTEXT_MAX_CHARS`].
pub const CONTEXT_KEEP_CHARS: usize = 300;

/// Hard cap on the rolling context text.
pub const CONTEXT_MAX_CHARS: usize = 500;

/// Chars of trailing context handed to the model as the initial prompt.
pub const CONTEXT_PROMPT_CHARS: usize = 200;

/// Report the GPU backend compiled into this build.
///
/// Returns a human-readable name based on the compile-time feature flags.
/// Only one GPU backend can be active at a time; if none is enabled, returns "CPU".
pub fn gpu_backend() -> &'static str {
    if cfg!(feature = "cuda") {
        "CUDA"
    } else if cfg!(feature = "vulkan") {
        "Vulkan"
    } else if cfg!(feature = "hipblas") {
        "HipBLAS (AMD)"
    } else if cfg!(feature = "openblas") {
        "OpenBLAS"
    } else {
        "CPU"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_keep_hysteresis() {
        assert!(VAD_SPEECH_THRESHOLD >= VAD_SILENCE_THRESHOLD);
    }

    #[test]
    fn chunk_overlap_is_shorter_than_chunk() {
        assert!(CHUNK_OVERLAP_SAMPLES < MAX_CHUNK_SAMPLES);
    }

    #[test]
    fn gpu_backend_matches_compiled_feature() {
        let expected = if cfg!(feature = "cuda") {
            "CUDA"
        } else if cfg!(feature = "vulkan") {
            "Vulkan"
        } else if cfg!(feature = "hipblas") {
            "HipBLAS (AMD)"
        } else if cfg!(feature = "openblas") {
            "OpenBLAS"
        } else {
            "CPU"
        };
        assert_eq!(gpu_backend(), expected);
    }
}
