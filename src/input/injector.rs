//! Text injection into the focused application.
//!
//! Two mechanisms:
//! - Typing: xdotool synthesizes per-character key events.
//! - Paste: clipboard is saved, replaced with the text, the paste chord is
//!   sent, and the old clipboard is restored after a delay.
//!
//! All tool invocations go through the `CommandExecutor` trait so tests run
//! without xdotool or a display server.

use crate::error::{HoldspeakError, Result};
use std::process::{Command, Stdio};
use std::time::Duration;

/// How long the clipboard keeps the injected text before restoration (ms).
const CLIPBOARD_RESTORE_DELAY_MS: u64 = 500;

/// Settle time before synthesizing the Return press (ms).
const RETURN_PRE_DELAY_MS: u64 = 50;

/// Gap between Return key down and up (ms).
const RETURN_PRESS_GAP_MS: u64 = 10;

/// Trait for executing system commands.
///
/// Object-safe, Send + Sync. `execute` discards output; `capture` returns
/// stdout for reading the clipboard.
pub trait CommandExecutor: Send + Sync {
    /// Run a command to completion, optionally feeding it stdin.
    fn execute(&self, command: &str, args: &[&str], stdin: Option<&str>) -> Result<()>;

    /// Run a command and return its stdout.
    fn capture(&self, command: &str, args: &[&str]) -> Result<String>;
}

/// Production executor using std::process::Command.
#[derive(Debug, Clone, Default)]
pub struct SystemCommandExecutor;

impl SystemCommandExecutor {
    pub fn new() -> Self {
        Self
    }

    fn map_spawn_error(command: &str, e: std::io::Error) -> HoldspeakError {
        if e.kind() == std::io::ErrorKind::NotFound {
            HoldspeakError::InjectionToolNotFound {
                tool: command.to_string(),
            }
        } else {
            HoldspeakError::InjectionFailed {
                message: format!("Failed to execute {}: {}", command, e),
            }
        }
    }
}

impl CommandExecutor for SystemCommandExecutor {
    fn execute(&self, command: &str, args: &[&str], stdin: Option<&str>) -> Result<()> {
        let mut cmd = Command::new(command);
        cmd.args(args).stderr(Stdio::null()).stdout(Stdio::null());

        let status = if let Some(input) = stdin {
            use std::io::Write;
            cmd.stdin(Stdio::piped());
            let mut child = cmd.spawn().map_err(|e| Self::map_spawn_error(command, e))?;
            if let Some(mut pipe) = child.stdin.take() {
                pipe.write_all(input.as_bytes())
                    .map_err(|e| HoldspeakError::InjectionFailed {
                        message: format!("Failed to write stdin to {}: {}", command, e),
                    })?;
            }
            child.wait().map_err(|e| HoldspeakError::InjectionFailed {
                message: format!("Failed to wait for {}: {}", command, e),
            })?
        } else {
            cmd.status().map_err(|e| Self::map_spawn_error(command, e))?
        };

        if !status.success() {
            return Err(HoldspeakError::InjectionFailed {
                message: format!("{} exited with {:?}", command, status.code()),
            });
        }
        Ok(())
    }

    fn capture(&self, command: &str, args: &[&str]) -> Result<String> {
        let output = Command::new(command)
            .args(args)
            .stderr(Stdio::null())
            .output()
            .map_err(|e| Self::map_spawn_error(command, e))?;

        if !output.status.success() {
            return Err(HoldspeakError::InjectionFailed {
                message: format!("{} exited with {:?}", command, output.status.code()),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }
}

/// Dispatch seam the pipeline and daemon talk to.
pub trait TextInjector: Send + Sync {
    /// Type text character by character, `delay_ms` between keystrokes.
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()>;

    /// Paste text via the clipboard, restoring the old contents afterwards
    /// when `restore_clipboard` is set.
    fn paste_text(&self, text: &str, restore_clipboard: bool) -> Result<()>;

    /// Synthesize a Return press-and-release.
    fn press_return(&self) -> Result<()>;
}

impl<T: TextInjector + ?Sized> TextInjector for std::sync::Arc<T> {
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        (**self).type_text(text, delay_ms)
    }

    fn paste_text(&self, text: &str, restore_clipboard: bool) -> Result<()> {
        (**self).paste_text(text, restore_clipboard)
    }

    fn press_return(&self) -> Result<()> {
        (**self).press_return()
    }
}

/// X11 injector built on xdotool + xclip.
pub struct X11Injector<E: CommandExecutor> {
    executor: E,
}

impl X11Injector<SystemCommandExecutor> {
    pub fn system() -> Self {
        Self::new(SystemCommandExecutor::new())
    }
}

impl<E: CommandExecutor> X11Injector<E> {
    pub fn new(executor: E) -> Self {
        Self { executor }
    }

    fn read_clipboard(&self) -> Option<String> {
        self.executor
            .capture("xclip", &["-selection", "clipboard", "-o"])
            .ok()
    }

    fn set_clipboard(&self, text: &str) -> Result<()> {
        self.executor
            .execute("xclip", &["-selection", "clipboard"], Some(text))
    }
}

impl<E: CommandExecutor> TextInjector for X11Injector<E> {
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        let delay = delay_ms.max(1).to_string();
        // --clearmodifiers keeps the held hotkey from turning keystrokes
        // into chords.
        self.executor.execute(
            "xdotool",
            &["type", "--clearmodifiers", "--delay", &delay, text],
            None,
        )
    }

    fn paste_text(&self, text: &str, restore_clipboard: bool) -> Result<()> {
        let saved = if restore_clipboard {
            self.read_clipboard()
        } else {
            None
        };

        self.set_clipboard(text)?;
        self.executor
            .execute("xdotool", &["key", "--clearmodifiers", "ctrl+v"], None)?;

        if let Some(old) = saved {
            std::thread::sleep(Duration::from_millis(CLIPBOARD_RESTORE_DELAY_MS));
            self.set_clipboard(&old)?;
        }
        Ok(())
    }

    fn press_return(&self) -> Result<()> {
        std::thread::sleep(Duration::from_millis(RETURN_PRE_DELAY_MS));
        let gap = RETURN_PRESS_GAP_MS.to_string();
        self.executor
            .execute("xdotool", &["key", "--delay", &gap, "Return"], None)
    }
}

/// Recording injector for tests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InjectedEvent {
    Typed { text: String, delay_ms: u64 },
    Pasted { text: String, restore: bool },
    Return,
}

/// Mock injector that records every dispatch.
#[derive(Default)]
pub struct MockInjector {
    events: std::sync::Mutex<Vec<InjectedEvent>>,
    fail: bool,
}

impl MockInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            events: std::sync::Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn events(&self) -> Vec<InjectedEvent> {
        self.events.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn record(&self, event: InjectedEvent) -> Result<()> {
        self.events
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(event);
        if self.fail {
            Err(HoldspeakError::InjectionFailed {
                message: "mock injection failure".to_string(),
            })
        } else {
            Ok(())
        }
    }
}

impl TextInjector for MockInjector {
    fn type_text(&self, text: &str, delay_ms: u64) -> Result<()> {
        self.record(InjectedEvent::Typed {
            text: text.to_string(),
            delay_ms,
        })
    }

    fn paste_text(&self, text: &str, restore_clipboard: bool) -> Result<()> {
        self.record(InjectedEvent::Pasted {
            text: text.to_string(),
            restore: restore_clipboard,
        })
    }

    fn press_return(&self) -> Result<()> {
        self.record(InjectedEvent::Return)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Executor that records invocations and plays back scripted clipboard
    /// contents.
    #[derive(Default)]
    struct ScriptedExecutor {
        invocations: Mutex<Vec<String>>,
        clipboard: Mutex<String>,
        missing_tools: Vec<String>,
    }

    impl ScriptedExecutor {
        fn with_clipboard(content: &str) -> Self {
            let exec = Self::default();
            *exec.clipboard.lock().unwrap() = content.to_string();
            exec
        }

        fn without_tool(tool: &str) -> Self {
            Self {
                missing_tools: vec![tool.to_string()],
                ..Default::default()
            }
        }

        fn invocations(&self) -> Vec<String> {
            self.invocations.lock().unwrap().clone()
        }
    }

    impl CommandExecutor for ScriptedExecutor {
        fn execute(&self, command: &str, args: &[&str], stdin: Option<&str>) -> Result<()> {
            if self.missing_tools.iter().any(|t| t == command) {
                return Err(HoldspeakError::InjectionToolNotFound {
                    tool: command.to_string(),
                });
            }
            self.invocations
                .lock()
                .unwrap()
                .push(format!("{} {}", command, args.join(" ")));
            if command == "xclip" {
                if let Some(text) = stdin {
                    *self.clipboard.lock().unwrap() = text.to_string();
                }
            }
            Ok(())
        }

        fn capture(&self, command: &str, args: &[&str]) -> Result<String> {
            if self.missing_tools.iter().any(|t| t == command) {
                return Err(HoldspeakError::InjectionToolNotFound {
                    tool: command.to_string(),
                });
            }
            self.invocations
                .lock()
                .unwrap()
                .push(format!("{} {}", command, args.join(" ")));
            Ok(self.clipboard.lock().unwrap().clone())
        }
    }

    #[test]
    fn type_text_uses_clearmodifiers_and_delay() {
        let injector = X11Injector::new(ScriptedExecutor::default());
        injector.type_text("hello world", 5).unwrap();

        let calls = injector.executor.invocations();
        assert_eq!(
            calls,
            vec!["xdotool type --clearmodifiers --delay 5 hello world"]
        );
    }

    #[test]
    fn type_text_enforces_minimum_delay() {
        let injector = X11Injector::new(ScriptedExecutor::default());
        injector.type_text("x", 0).unwrap();

        let calls = injector.executor.invocations();
        assert!(calls[0].contains("--delay 1"), "got: {}", calls[0]);
    }

    #[test]
    fn paste_saves_sets_pastes_and_restores() {
        let injector = X11Injector::new(ScriptedExecutor::with_clipboard("old contents"));
        injector.paste_text("new text", true).unwrap();

        let calls = injector.executor.invocations();
        assert_eq!(calls[0], "xclip -selection clipboard -o"); // save
        assert_eq!(calls[1], "xclip -selection clipboard"); // set
        assert_eq!(calls[2], "xdotool key --clearmodifiers ctrl+v"); // paste
        assert_eq!(calls[3], "xclip -selection clipboard"); // restore
        assert_eq!(*injector.executor.clipboard.lock().unwrap(), "old contents");
    }

    #[test]
    fn paste_without_restore_skips_clipboard_read() {
        let injector = X11Injector::new(ScriptedExecutor::with_clipboard("old"));
        injector.paste_text("new", false).unwrap();

        let calls = injector.executor.invocations();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0], "xclip -selection clipboard");
        assert_eq!(calls[1], "xdotool key --clearmodifiers ctrl+v");
        assert_eq!(*injector.executor.clipboard.lock().unwrap(), "new");
    }

    #[test]
    fn press_return_sends_return_key() {
        let injector = X11Injector::new(ScriptedExecutor::default());
        injector.press_return().unwrap();

        let calls = injector.executor.invocations();
        assert_eq!(calls, vec!["xdotool key --delay 10 Return"]);
    }

    #[test]
    fn missing_xdotool_surfaces_tool_error() {
        let injector = X11Injector::new(ScriptedExecutor::without_tool("xdotool"));
        let err = injector.type_text("hi there", 5).unwrap_err();
        match err {
            HoldspeakError::InjectionToolNotFound { tool } => assert_eq!(tool, "xdotool"),
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn mock_injector_records_in_order() {
        let mock = MockInjector::new();
        mock.type_text("abc", 5).unwrap();
        mock.press_return().unwrap();

        assert_eq!(
            mock.events(),
            vec![
                InjectedEvent::Typed {
                    text: "abc".to_string(),
                    delay_ms: 5
                },
                InjectedEvent::Return,
            ]
        );
    }

    #[test]
    fn mock_failure_still_records() {
        let mock = MockInjector::failing();
        assert!(mock.type_text("abc", 5).is_err());
        assert_eq!(mock.events().len(), 1);
    }
}
