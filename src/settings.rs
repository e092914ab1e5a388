//! Persisted settings for holdspeak.
//!
//! One JSON blob (`~/.config/holdspeak/settings.json`) keyed by field name.
//! Every field has a default, so a missing file, a partial file, and a file
//! with unknown keys all load cleanly.

use crate::defaults;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Decoding strategy for the speech model.
///
/// Each variant carries the parameter that only makes sense for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SamplingStrategy {
    /// Greedy decoding, keeping the best of `best_of` candidates.
    Greedy { best_of: i32 },
    /// Beam search with `beam_size` beams.
    BeamSearch { beam_size: i32 },
}

impl Default for SamplingStrategy {
    fn default() -> Self {
        Self::Greedy { best_of: 5 }
    }
}

/// How transcribed text reaches the focused application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputMode {
    /// Simulated per-character keystrokes.
    Type,
    /// Clipboard set + paste chord, clipboard restored afterwards.
    Paste,
}

/// When transcription happens relative to the held key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TranscriptionMode {
    /// One transcription when the key is released.
    Buffered,
    /// Text is emitted at each pause while the key stays held.
    Continuous,
}

/// Voice activity detection tuning.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VadSettings {
    pub enabled: bool,
    pub speech_threshold: f32,
    pub silence_threshold: f32,
    pub min_speech_ms: u32,
    pub min_silence_ms: u32,
    pub pre_padding_ms: u32,
    pub post_padding_ms: u32,
}

impl Default for VadSettings {
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

/// Everything the daemon persists between runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    // Decoding
    pub strategy: SamplingStrategy,
    pub temperature: f32,
    pub language: String,
    pub translate: bool,
    pub thread_count: i32,
    pub use_gpu: bool,
    pub flash_attention: bool,
    pub initial_prompt: String,

    // Whisper decode knobs
    pub single_segment: bool,
    pub no_timestamps: bool,
    pub token_timestamps: bool,
    pub suppress_blank: bool,
    pub suppress_non_speech_tokens: bool,
    pub entropy_threshold: f32,
    pub logprob_threshold: f32,
    pub no_speech_threshold: f32,

    // Audio
    pub vad: VadSettings,
    pub input_gain: f32,
    pub device: Option<String>,
    pub keep_mic_warm: bool,

    // Output
    pub output_mode: OutputMode,
    pub type_speed_ms: u64,
    pub restore_clipboard: bool,
    pub send_return_delay_ms: u64,

    // Hotkeys
    pub hotkey_keysym: u32,
    pub send_hotkey_keysym: u32,
    pub release_delay_ms: u64,

    // Mode
    pub transcription_mode: TranscriptionMode,

    // Last loaded model name, so restarts pick it up again
    pub model: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            strategy: SamplingStrategy::default(),
            temperature: 0.0,
            language: "en".to_string(),
            translate: false,
            thread_count: 0,
            use_gpu: true,
            flash_attention: true,
            initial_prompt: String::new(),

            single_segment: false,
            no_timestamps: false,
            token_timestamps: false,
            suppress_blank: true,
            suppress_non_speech_tokens: true,
            entropy_threshold: 2.4,
            logprob_threshold: -1.0,
            no_speech_threshold: 0.6,

            vad: VadSettings::default(),
            input_gain: 1.0,
            device: None,
            keep_mic_warm: true,

            output_mode: OutputMode::Type,
            type_speed_ms: 5,
            restore_clipboard: true,
            send_return_delay_ms: 200,

            hotkey_keysym: 0xFFC9,      // XK_F12
            send_hotkey_keysym: 0xFFC8, // XK_F11
            release_delay_ms: 300,

            transcription_mode: TranscriptionMode::Continuous,

            model: String::new(),
        }
    }
}

impl Settings {
    /// Inference thread count with the 0 = auto rule resolved.
    ///
    /// Auto leaves two cores for the audio path and UI, clamped to 1..=8.
    pub fn resolved_thread_count(&self) -> i32 {
        if self.thread_count > 0 {
            return self.thread_count;
        }
        let hw = std::thread::available_parallelism()
            .map(|n| n.get() as i32)
            .unwrap_or(4);
        (hw - 2).clamp(1, 8)
    }

    /// Default settings file path: `~/.config/holdspeak/settings.json`.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("holdspeak")
            .join("settings.json")
    }

    /// Load settings from the default path, falling back to defaults on a
    /// missing or unreadable file. A present-but-corrupt file also falls back
    /// rather than refusing to start.
    pub fn load() -> Self {
        Self::load_from(&Self::default_path())
    }

    /// Load settings from an explicit path.
    pub fn load_from(path: &std::path::Path) -> Self {
        match fs::read_to_string(path) {
            Ok(contents) => serde_json::from_str(&contents).unwrap_or_default(),
            Err(_) => Self::default(),
        }
    }

    /// Persist settings to the default path, creating the directory if needed.
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::default_path())
    }

    /// Persist settings to an explicit path.
    pub fn save_to(&self, path: &std::path::Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json + "\n")?;
        Ok(())
    }

    /// Apply environment variable overrides.
    ///
    /// Supported variables:
    /// - HOLDSPEAK_MODEL → model
    /// - HOLDSPEAK_LANGUAGE → language
    /// - HOLDSPEAK_DEVICE → device
    pub fn with_env_overrides(mut self) -> Self {
        if let Ok(model) = std::env::var("HOLDSPEAK_MODEL") {
            if !model.is_empty() {
                self.model = model;
            }
        }
        if let Ok(language) = std::env::var("HOLDSPEAK_LANGUAGE") {
            if !language.is_empty() {
                self.language = language;
            }
        }
        if let Ok(device) = std::env::var("HOLDSPEAK_DEVICE") {
            if !device.is_empty() {
                self.device = Some(device);
            }
        }
        self
    }
}
