//! JSON message protocol between the CLI and the daemon.

use serde::{Deserialize, Serialize};

/// Commands sent by the CLI to the daemon.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Report daemon state.
    Status,
    /// Shut the daemon down.
    Stop,
    /// List local models.
    Models,
    /// Switch to a model by name.
    Model { name: String },
    /// Toggle continuous transcription.
    Continuous { on: bool },
    /// Toggle keeping the microphone open between recordings.
    MicWarm { on: bool },
    /// Rescan the models directory.
    Reload,
    /// Start or stop recording, for compositor keybindings that can't hold
    /// a key grab themselves. `send` mimics the talk+send hotkey.
    Toggle { send: bool },
}

impl Command {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

/// One entry in the `models` listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelEntry {
    pub name: String,
    pub size_mb: u64,
    pub current: bool,
}

/// Responses sent by the daemon to the CLI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Command succeeded.
    Ok { message: String },
    /// Daemon status snapshot.
    Status {
        state: String,
        model: Option<String>,
        continuous: bool,
        total_transcriptions: u32,
        average_rtf: f64,
    },
    /// Model listing.
    Models { models: Vec<ModelEntry> },
    /// Command failed.
    Error { message: String },
}

impl Response {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn from_json(s: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Human-readable rendering for the CLI.
    pub fn render(&self) -> String {
        match self {
            Response::Ok { message } => message.clone(),
            Response::Status {
                state,
                model,
                continuous,
                total_transcriptions,
                average_rtf,
            } => {
                let mut out = state.clone();
                if let Some(model) = model {
                    out.push_str(&format!("\nmodel: {}", model));
                }
                out.push_str(&format!(
                    "\nmode: {}",
                    if *continuous { "continuous" } else { "buffered" }
                ));
                out.push_str(&format!("\ntotal: {}", total_transcriptions));
                if *total_transcriptions > 0 {
                    out.push_str(&format!("\navg_rtf: {:.2}", average_rtf));
                }
                out
            }
            Response::Models { models } => {
                let mut out = String::new();
                for m in models {
                    out.push_str(&format!(
                        "{} {} ({} MB)\n",
                        if m.current { "*" } else { " " },
                        m.name,
                        m.size_mb
                    ));
                }
                out.trim_end().to_string()
            }
            Response::Error { message } => format!("error: {}", message),
        }
    }

    /// Exit code for the CLI: 0 on success, 1 on error.
    pub fn exit_code(&self) -> i32 {
        if matches!(self, Response::Error { .. }) {
            1
        } else {
            0
        }
    }
}
