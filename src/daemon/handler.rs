//! IPC command handler for the daemon.

use crate::daemon::Daemon;
use crate::ipc::protocol::{Command, ModelEntry, Response};
use crate::ipc::server::CommandHandler;
use crate::pipeline::Pipeline;
use crate::settings::TranscriptionMode;
use std::sync::Arc;

/// Maps control commands onto the daemon and its pipeline.
pub struct DaemonCommandHandler {
    daemon: Arc<Daemon>,
    shutdown: Arc<tokio::sync::Notify>,
}

impl DaemonCommandHandler {
    pub fn new(daemon: Arc<Daemon>, shutdown: Arc<tokio::sync::Notify>) -> Self {
        Self { daemon, shutdown }
    }

    fn pipeline(&self) -> &Arc<Pipeline> {
        self.daemon.pipeline()
    }

    fn toggle(&self, send: bool) -> Response {
        if self.pipeline().is_recording() {
            self.daemon.handle_key_up(send);
            Response::Ok {
                message: "ok: stopped".to_string(),
            }
        } else {
            self.daemon.handle_key_down();
            if self.pipeline().is_recording() {
                Response::Ok {
                    message: "ok: recording".to_string(),
                }
            } else {
                Response::Error {
                    message: "could not start recording".to_string(),
                }
            }
        }
    }

    fn status(&self) -> Response {
        let pipeline = self.pipeline();
        let state = if pipeline.is_recording() {
            "recording"
        } else if pipeline.is_transcribing() {
            "transcribing"
        } else {
            "idle"
        };

        let model = pipeline.with_models(|m| m.current().map(|m| m.name().to_string()));
        let settings = pipeline.settings();
        let (total, avg_rtf) = pipeline.with_perf(|p| (p.total(), p.average_rtf()));

        Response::Status {
            state: state.to_string(),
            model,
            continuous: settings.transcription_mode == TranscriptionMode::Continuous,
            total_transcriptions: total,
            average_rtf: avg_rtf,
        }
    }

    fn list_models(&self) -> Response {
        let models = self.pipeline().with_models(|m| {
            let current = m.current().map(|c| c.id.clone());
            m.available()
                .iter()
                .map(|model| ModelEntry {
                    name: model.name().to_string(),
                    size_mb: model.size / 1_000_000,
                    current: current.as_deref() == Some(model.id.as_str()),
                })
                .collect::<Vec<_>>()
        });
        Response::Models { models }
    }

    fn switch_model(&self, name: &str) -> Response {
        let model = self.pipeline().with_models(|m| m.find(name).cloned());
        match model {
            Some(model) => match self.pipeline().load_model(&model) {
                Ok(()) => Response::Ok {
                    message: format!("ok: loaded {}", model.name()),
                },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
            None => Response::Error {
                message: "model not found".to_string(),
            },
        }
    }

    fn set_continuous(&self, on: bool) -> Response {
        let mut settings = self.pipeline().settings();
        settings.transcription_mode = if on {
            TranscriptionMode::Continuous
        } else {
            TranscriptionMode::Buffered
        };
        self.pipeline().update_settings(settings);
        Response::Ok {
            message: "ok".to_string(),
        }
    }

    fn set_mic_warm(&self, on: bool) -> Response {
        let mut settings = self.pipeline().settings();
        settings.keep_mic_warm = on;
        self.pipeline().update_settings(settings);

        if on {
            if let Err(e) = self.pipeline().prepare_capture() {
                return Response::Error {
                    message: e.to_string(),
                };
            }
        } else {
            self.pipeline().release_capture();
        }
        Response::Ok {
            message: "ok".to_string(),
        }
    }

    fn reload(&self) -> Response {
        let count = self.pipeline().with_models(|m| {
            m.scan();
            m.available().len()
        });
        Response::Ok {
            message: format!("ok: {} models", count),
        }
    }
}

#[async_trait::async_trait]
impl CommandHandler for DaemonCommandHandler {
    async fn handle(&self, command: Command) -> Response {
        match command {
            Command::Status => self.status(),
            Command::Stop => {
                self.shutdown.notify_one();
                Response::Ok {
                    message: "ok".to_string(),
                }
            }
            Command::Models => self.list_models(),
            Command::Model { name } => self.switch_model(&name),
            Command::Continuous { on } => self.set_continuous(on),
            Command::MicWarm { on } => self.set_mic_warm(on),
            Command::Reload => self.reload(),
            Command::Toggle { send } => self.toggle(send),
        }
    }
}
