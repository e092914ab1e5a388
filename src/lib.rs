//! holdspeak - push-to-talk transcription for Linux.
//!
//! Hold a key, speak, and the transcription is typed into whatever has
//! input focus. Offline: audio never leaves the machine.

pub mod audio;
pub mod daemon;
pub mod defaults;
pub mod error;
pub mod input;
pub mod ipc;
pub mod models;
pub mod pipeline;
pub mod settings;
pub mod stt;
pub mod text;

/// Version string including the git hash when built from a checkout.
pub fn version_string() -> String {
    match option_env!("GIT_HASH") {
        Some(hash) => format!("{} ({})", env!("CARGO_PKG_VERSION"), hash),
        None => env!("CARGO_PKG_VERSION").to_string(),
    }
}
