//! Blocking IPC client used by the CLI side of the binary.
//!
//! The control commands are one-shot: connect, send a JSON line, read one
//! back. No async runtime needed on this side.

use crate::error::{HoldspeakError, Result};
use crate::ipc::protocol::{Command, Response};
use crate::ipc::server::IpcServer;
use std::io::{BufRead, BufReader, Write};
use std::os::unix::net::UnixStream;
use std::path::Path;

/// Send one command to the daemon and wait for the response.
pub fn send_command(command: &Command) -> Result<Response> {
    send_command_to(&IpcServer::default_socket_path(), command)
}

/// Send a command to a daemon listening on an explicit socket path.
pub fn send_command_to(socket_path: &Path, command: &Command) -> Result<Response> {
    let stream = UnixStream::connect(socket_path).map_err(|_| HoldspeakError::IpcConnection {
        message: "holdspeak daemon not running".to_string(),
    })?;

    let json = command.to_json().map_err(|e| HoldspeakError::IpcProtocol {
        message: format!("Failed to serialize command: {}", e),
    })?;

    let mut writer = stream.try_clone().map_err(|e| HoldspeakError::IpcConnection {
        message: format!("Failed to clone stream: {}", e),
    })?;
    writer
        .write_all(json.as_bytes())
        .and_then(|_| writer.write_all(b"\n"))
        .and_then(|_| writer.flush())
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to send command: {}", e),
        })?;

    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    reader
        .read_line(&mut line)
        .map_err(|e| HoldspeakError::IpcConnection {
            message: format!("Failed to read response: {}", e),
        })?;

    Response::from_json(line.trim()).map_err(|e| HoldspeakError::IpcProtocol {
        message: format!("Malformed response: {}", e),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{BufRead, Write};
    use std::os::unix::net::UnixListener;
    use tempfile::TempDir;

    #[test]
    fn connect_failure_reports_daemon_not_running() {
        let err = send_command_to(Path::new("/tmp/holdspeak-test-nonexistent.sock"), &Command::Status)
            .unwrap_err();
        assert!(err.to_string().contains("not running"));
    }

    #[test]
    fn roundtrip_against_blocking_listener() {
        let dir = TempDir::new().unwrap();
        let socket = dir.path().join("test.sock");
        let listener = UnixListener::bind(&socket).unwrap();

        let server = std::thread::spawn(move || {
            let (stream, _) = listener.accept().unwrap();
            let mut reader = std::io::BufReader::new(stream.try_clone().unwrap());
            let mut line = String::new();
            reader.read_line(&mut line).unwrap();

            let command = Command::from_json(line.trim()).unwrap();
            assert_eq!(command, Command::Reload);

            let response = Response::Ok {
                message: "ok: 2 models".to_string(),
            };
            let mut stream = stream;
            writeln!(stream, "{}", response.to_json().unwrap()).unwrap();
        });

        let response = send_command_to(&socket, &Command::Reload).unwrap();
        assert_eq!(
            response,
            Response::Ok {
                message: "ok: 2 models".to_string()
            }
        );
        server.join().unwrap();
    }
}
