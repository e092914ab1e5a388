//! The daemon: hotkey orchestration around the pipeline plus the IPC
//! control surface.

pub mod handler;

use crate::error::{HoldspeakError, Result};
use crate::input::hook::{HookEvent, InputHook};
use crate::input::injector::X11Injector;
use crate::ipc::server::IpcServer;
use crate::pipeline::Pipeline;
use crate::settings::Settings;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Hotkey-side daemon state.
///
/// Key events arrive on the hook thread; each release spawns a short-lived
/// worker that waits out the release delay, runs the final transcription,
/// and handles the talk+send Return keystroke.
pub struct Daemon {
    pipeline: Arc<Pipeline>,
    /// True from key-up until its transcription returns. Key-downs that
    /// arrive in that window are dropped rather than starting a recording
    /// whose stop would race the in-flight one.
    stop_in_progress: Arc<AtomicBool>,
}

impl Daemon {
    pub fn new(pipeline: Arc<Pipeline>) -> Self {
        Self {
            pipeline,
            stop_in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn pipeline(&self) -> &Arc<Pipeline> {
        &self.pipeline
    }

    /// Key went down: start recording unless a stop is still in flight.
    pub fn handle_key_down(&self) {
        if self.stop_in_progress.load(Ordering::SeqCst) {
            return;
        }
        if let Err(e) = self.pipeline.start_recording() {
            eprintln!("holdspeak: {}", e);
        }
    }

    /// Key came up: wait out the release delay off-thread, then stop and
    /// transcribe. The talk+send key presses Return after a successful
    /// dispatch.
    pub fn handle_key_up(&self, is_send: bool) {
        if !self.pipeline.is_recording() {
            return;
        }
        if self.stop_in_progress.swap(true, Ordering::SeqCst) {
            return;
        }

        let pipeline = Arc::clone(&self.pipeline);
        let stop_in_progress = Arc::clone(&self.stop_in_progress);
        std::thread::spawn(move || {
            let settings = pipeline.settings();

            // Capture trails the physical release a little so the last word
            // isn't clipped.
            if settings.release_delay_ms > 0 {
                std::thread::sleep(Duration::from_millis(settings.release_delay_ms));
            }

            pipeline.stop_recording_and_transcribe();

            if is_send && pipeline.did_output_text() {
                std::thread::sleep(Duration::from_millis(settings.send_return_delay_ms));
                pipeline.press_return();
            }

            stop_in_progress.store(false, Ordering::SeqCst);
        });
    }

    /// Consume hook events on a dedicated thread until the channel closes.
    pub fn spawn_event_loop(self: Arc<Self>, events: Receiver<HookEvent>) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            for event in events {
                match event {
                    HookEvent::KeyDown { .. } => self.handle_key_down(),
                    HookEvent::KeyUp { is_send } => self.handle_key_up(is_send),
                }
            }
        })
    }
}

/// Run the daemon until Ctrl+C or a `stop` command.
///
/// Wires together the pipeline, the hotkey hook, and the IPC server. The
/// model is loaded up front (from `model_path` or the models directory) so
/// the first hotkey press doesn't pay the load cost.
///
/// `hook` is optional: without one, recording is driven entirely through
/// `holdspeak toggle` (compositor keybindings).
pub async fn run(
    settings: Settings,
    hook: Option<Box<dyn InputHook>>,
    model_path: Option<std::path::PathBuf>,
    verbosity: u8,
) -> Result<()> {
    use crate::audio::capture::AudioCapture;
    use crate::audio::vad::VadConfig;

    let capture = AudioCapture::new(VadConfig::from(settings.vad), settings.device.clone());
    let pipeline = Pipeline::new(
        capture,
        Box::new(X11Injector::system()),
        settings.clone(),
        verbosity,
    );

    match model_path {
        Some(path) => {
            let model = crate::models::WhisperModel::from_path(path.clone()).ok_or_else(|| {
                HoldspeakError::ModelNotFound {
                    path: path.to_string_lossy().to_string(),
                }
            })?;
            pipeline.load_model(&model)?;
        }
        None => pipeline.load_first_available()?,
    }

    if settings.keep_mic_warm {
        if let Err(e) = pipeline.prepare_capture() {
            eprintln!("holdspeak: {}", e);
        }
    }

    let daemon = Arc::new(Daemon::new(Arc::clone(&pipeline)));

    // Hotkey plumbing, when a hook was supplied
    let mut hook = hook;
    let mut event_loop = None;
    if let Some(hook) = hook.as_mut() {
        let (event_tx, event_rx) = crossbeam_channel::unbounded();
        hook.set_key_codes(settings.hotkey_keysym, settings.send_hotkey_keysym);
        if !hook.start(event_tx) {
            return Err(HoldspeakError::HotkeyStartFailed {
                message: "could not attach the hotkey hook (is a display server running?)"
                    .to_string(),
            });
        }
        event_loop = Some(Arc::clone(&daemon).spawn_event_loop(event_rx));
    }

    // IPC control surface
    let shutdown = Arc::new(tokio::sync::Notify::new());
    let server = Arc::new(IpcServer::new(IpcServer::default_socket_path()));
    let ipc_handler =
        handler::DaemonCommandHandler::new(Arc::clone(&daemon), Arc::clone(&shutdown));
    let server_task = {
        let server = Arc::clone(&server);
        tokio::spawn(async move { server.start(ipc_handler).await })
    };

    if hook.is_some() {
        eprintln!(
            "holdspeak: ready — hold-to-talk on the configured keys, Ctrl+C to quit ({} backend)",
            crate::defaults::gpu_backend()
        );
    } else {
        eprintln!(
            "holdspeak: ready — bind a key to `holdspeak toggle`, Ctrl+C to quit ({} backend)",
            crate::defaults::gpu_backend()
        );
    }

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {}
        _ = shutdown.notified() => {}
    }

    eprintln!("holdspeak: shutting down");
    if let Some(hook) = hook.as_mut() {
        hook.stop();
    }
    server.stop();
    let _ = server_task.await;
    pipeline.shutdown();

    // Persist whatever the control surface changed at runtime
    if let Err(e) = pipeline.settings().save() {
        eprintln!("holdspeak: failed to save settings: {}", e);
    }

    drop(event_loop);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::capture::AudioCapture;
    use crate::audio::vad::VadConfig;
    use crate::input::injector::{InjectedEvent, MockInjector};
    use crate::settings::TranscriptionMode;
    use crate::stt::transcriber::MockTranscriber;
    use std::time::Duration;

    fn test_daemon(transcriber: MockTranscriber, injector: Arc<MockInjector>) -> Daemon {
        let mut settings = Settings {
            transcription_mode: TranscriptionMode::Buffered,
            release_delay_ms: 0,
            send_return_delay_ms: 0,
            ..Default::default()
        };
        settings.vad.enabled = false;

        let capture = AudioCapture::headless(VadConfig::from(settings.vad));
        let pipeline = Pipeline::new(capture, Box::new(injector), settings, 0);
        pipeline.set_transcriber(Arc::new(transcriber));
        Daemon::new(pipeline)
    }

    fn wait_for_worker(daemon: &Daemon) {
        for _ in 0..200 {
            if !daemon.stop_in_progress.load(Ordering::SeqCst) {
                return;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        panic!("key-up worker did not finish");
    }

    #[test]
    fn hold_and_release_types_transcription() {
        let injector = Arc::new(MockInjector::new());
        let daemon = test_daemon(
            MockTranscriber::new("mock").with_response(" typed output"),
            Arc::clone(&injector),
        );

        daemon.handle_key_down();
        assert!(daemon.pipeline.is_recording());
        daemon.pipeline.capture_shared().ingest(&vec![0.05; 16_000]);

        daemon.handle_key_up(false);
        wait_for_worker(&daemon);

        assert_eq!(
            injector.events(),
            vec![InjectedEvent::Typed {
                text: "typed output".to_string(),
                delay_ms: 5
            }]
        );
    }

    #[test]
    fn send_key_presses_return_after_output() {
        let injector = Arc::new(MockInjector::new());
        let daemon = test_daemon(
            MockTranscriber::new("mock").with_response(" send this"),
            Arc::clone(&injector),
        );

        daemon.handle_key_down();
        daemon.pipeline.capture_shared().ingest(&vec![0.05; 16_000]);
        daemon.handle_key_up(true);
        wait_for_worker(&daemon);

        assert_eq!(
            injector.events(),
            vec![
                InjectedEvent::Typed {
                    text: "send this".to_string(),
                    delay_ms: 5
                },
                InjectedEvent::Return,
            ]
        );
    }

    #[test]
    fn send_key_without_output_skips_return() {
        let injector = Arc::new(MockInjector::new());
        // Hallucinated-only result: nothing dispatched
        let daemon = test_daemon(
            MockTranscriber::new("mock").with_response(" Thank you."),
            Arc::clone(&injector),
        );

        daemon.handle_key_down();
        daemon.pipeline.capture_shared().ingest(&vec![0.05; 16_000]);
        daemon.handle_key_up(true);
        wait_for_worker(&daemon);

        assert!(injector.events().is_empty());
    }

    #[test]
    fn key_up_without_recording_is_ignored() {
        let injector = Arc::new(MockInjector::new());
        let daemon = test_daemon(MockTranscriber::new("mock"), Arc::clone(&injector));

        daemon.handle_key_up(false);
        assert!(!daemon.stop_in_progress.load(Ordering::SeqCst));
        assert!(injector.events().is_empty());
    }

    #[test]
    fn event_loop_drives_key_events() {
        let injector = Arc::new(MockInjector::new());
        let daemon = Arc::new(test_daemon(
            MockTranscriber::new("mock").with_response(" via events"),
            Arc::clone(&injector),
        ));

        let (tx, rx) = crossbeam_channel::unbounded();
        let handle = Arc::clone(&daemon).spawn_event_loop(rx);

        tx.send(HookEvent::KeyDown { is_send: false }).unwrap();
        for _ in 0..200 {
            if daemon.pipeline.is_recording() {
                break;
            }
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(daemon.pipeline.is_recording());

        daemon.pipeline.capture_shared().ingest(&vec![0.05; 16_000]);
        tx.send(HookEvent::KeyUp { is_send: false }).unwrap();
        drop(tx);
        handle.join().unwrap();
        wait_for_worker(&daemon);

        assert_eq!(injector.events().len(), 1);
    }
}
