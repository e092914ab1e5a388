//! Error types for holdspeak.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum HoldspeakError {
    // Audio capture errors
    #[error("No audio input device available{}", .device.as_deref().map(|d| format!(" (requested: {})", d)).unwrap_or_default())]
    NoInputDevice { device: Option<String> },

    #[error("Audio capture failed: {message}")]
    AudioCapture { message: String },

    // Transcription errors
    #[error("Model file not found at {path}")]
    ModelNotFound { path: String },

    #[error("Failed to load model {path}: {message}")]
    ModelLoadFailed { path: String, message: String },

    #[error("Transcription failed: {message}")]
    Transcription { message: String },

    // Hotkey errors
    #[error("Hotkey permission denied: {message}")]
    HotkeyPermissionDenied { message: String },

    #[error("Hotkey hook failed to start: {message}")]
    HotkeyStartFailed { message: String },

    // Text injection errors
    #[error("Text injection tool not found: {tool}")]
    InjectionToolNotFound { tool: String },

    #[error("Text injection failed: {message}")]
    InjectionFailed { message: String },

    // IPC errors
    #[error("IPC socket error: {message}")]
    IpcSocket { message: String },

    #[error("IPC protocol error: {message}")]
    IpcProtocol { message: String },

    #[error("IPC connection failed: {message}")]
    IpcConnection { message: String },

    // Settings errors
    #[error("Settings error: {0}")]
    Settings(#[from] serde_json::Error),

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, HoldspeakError>;
