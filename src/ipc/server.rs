//! Async Unix socket IPC server for daemon control.

use crate::error::{HoldspeakError, Result};
use crate::ipc::protocol::{Command, Response};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

/// Handler trait for processing IPC commands.
#[async_trait::async_trait]
pub trait CommandHandler: Send + Sync {
    /// Handle a command and return a response.
    async fn handle(&self, command: Command) -> Response;
}

/// IPC server listening on a Unix socket.
pub struct IpcServer {
    socket_path: PathBuf,
    shutdown: Arc<AtomicBool>,
}

impl IpcServer {
    pub fn new(socket_path: PathBuf) -> Self {
        Self {
            socket_path,
            shutdown: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Default socket path: `$XDG_RUNTIME_DIR/holdspeak.sock`, or a per-uid
    /// file in /tmp when no runtime dir exists.
    pub fn default_socket_path() -> PathBuf {
        if let Ok(runtime) = std::env::var("XDG_RUNTIME_DIR") {
            if !runtime.is_empty() {
                return PathBuf::from(runtime).join("holdspeak.sock");
            }
        }
        let uid = unsafe { libc::getuid() };
        PathBuf::from(format!("/tmp/holdspeak-{}.sock", uid))
    }

    /// Serve connections until [`IpcServer::stop`] is called.
    pub async fn start<H>(&self, handler: H) -> Result<()>
    where
        H: CommandHandler + 'static,
    {
        // Stale socket from a previous run
        if self.socket_path.exists() {
            std::fs::remove_file(&self.socket_path).map_err(|e| HoldspeakError::IpcSocket {
                message: format!("Failed to remove existing socket: {}", e),
            })?;
        }

        let listener =
            UnixListener::bind(&self.socket_path).map_err(|e| HoldspeakError::IpcSocket {
                message: format!("Failed to bind to socket: {}", e),
            })?;

        let handler = Arc::new(handler);

        loop {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }

            // Accept with a timeout so the shutdown flag gets polled
            let accept =
                tokio::time::timeout(tokio::time::Duration::from_millis(100), listener.accept())
                    .await;

            match accept {
                Ok(Ok((stream, _))) => {
                    let handler = Arc::clone(&handler);
                    tokio::spawn(async move {
                        if let Err(e) = handle_client(stream, handler).await {
                            eprintln!("holdspeak: ipc client error: {}", e);
                        }
                    });
                }
                Ok(Err(e)) => {
                    return Err(HoldspeakError::IpcConnection {
                        message: format!("Failed to accept connection: {}", e),
                    });
                }
                Err(_) => continue,
            }
        }

        Ok(())
    }

    /// Stop the accept loop and remove the socket file.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if self.socket_path.exists() {
            let _ = std::fs::remove_file(&self.socket_path);
        }
    }
}

/// Handle a single client: one JSON command line in, one response line out.
async fn handle_client<H>(stream: UnixStream, handler: Arc<H>) -> Result<()>
where
    H: CommandHandler,
{
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    reader
        .read_line(&mut line)
        .await
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to read from client: {}", e),
        })?;

    let response = match Command::from_json(line.trim()) {
        Ok(command) => handler.handle(command).await,
        Err(e) => Response::Error {
            message: format!("unknown command: {}", e),
        },
    };

    let response_json = response.to_json().map_err(|e| HoldspeakError::IpcProtocol {
        message: format!("Failed to serialize response: {}", e),
    })?;

    writer
        .write_all(response_json.as_bytes())
        .await
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;
    writer
        .write_all(b"\n")
        .await
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to write to client: {}", e),
        })?;
    writer
        .flush()
        .await
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to flush writer: {}", e),
        })?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct EchoHandler;

    #[async_trait::async_trait]
    impl CommandHandler for EchoHandler {
        async fn handle(&self, command: Command) -> Response {
            Response::Ok {
                message: format!("{:?}", command),
            }
        }
    }

    async fn send_line(path: &Path, line: &str) -> String {
        let stream = UnixStream::connect(path).await.unwrap();
        let (reader, mut writer) = stream.into_split();
        writer.write_all(line.as_bytes()).await.unwrap();
        writer.write_all(b"\n").await.unwrap();
        writer.flush().await.unwrap();

        let mut reader = BufReader::new(reader);
        let mut response = String::new();
        reader.read_line(&mut response).await.unwrap();
        response
    }

    #[tokio::test]
    async fn server_roundtrips_a_command() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("holdspeak.sock");

        let server = Arc::new(IpcServer::new(socket.clone()));
        let server_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start(EchoHandler).await })
        };

        // Wait for the socket to appear
        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }

        let line = Command::Status.to_json().unwrap();
        let response_line = send_line(&socket, &line).await;
        let response = Response::from_json(response_line.trim()).unwrap();
        assert_eq!(
            response,
            Response::Ok {
                message: "Status".to_string()
            }
        );

        server.stop();
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn malformed_command_yields_error_response() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("holdspeak.sock");

        let server = Arc::new(IpcServer::new(socket.clone()));
        let server_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start(EchoHandler).await })
        };

        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }

        let response_line = send_line(&socket, "this is not json").await;
        let response = Response::from_json(response_line.trim()).unwrap();
        assert!(matches!(response, Response::Error { .. }));

        server.stop();
        let _ = server_task.await;
    }

    #[tokio::test]
    async fn stop_removes_socket_file() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("holdspeak.sock");

        let server = Arc::new(IpcServer::new(socket.clone()));
        let server_task = {
            let server = Arc::clone(&server);
            tokio::spawn(async move { server.start(EchoHandler).await })
        };

        for _ in 0..50 {
            if socket.exists() {
                break;
            }
            tokio::time::sleep(tokio::time::Duration::from_millis(10)).await;
        }
        assert!(socket.exists());

        server.stop();
        let _ = server_task.await;
        assert!(!socket.exists());
    }

    #[test]
    fn default_socket_path_uses_runtime_dir_shape() {
        let path = IpcServer::default_socket_path();
        let name = path.file_name().unwrap().to_string_lossy();
        assert!(name.starts_with("holdspeak"));
        assert!(name.ends_with(".sock"));
    }
}
