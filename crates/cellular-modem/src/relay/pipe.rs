//! Named-pipe transport for the command relay
//!
//! Two FIFOs, one per direction. Each role writes one and listens on the
//! other. Senders open, write one line and close; the listener reopens its
//! FIFO every time the last writer disconnects.

use cellular_core::{CellularError, ParseError, PipeError};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::stat::Mode;
use nix::unistd::mkfifo;
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Write};
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};

use super::{Message, MessageSink, Role};
use crate::config::PipeConfig;

/// One end of the relay
#[derive(Debug, Clone)]
pub struct CommandPipe {
    role: Role,
    listen_path: PathBuf,
    write_path: PathBuf,
}

impl CommandPipe {
    /// Create both FIFOs if absent and bind the paths for `role`
    pub fn open(config: &PipeConfig, role: Role) -> Result<Self, PipeError> {
        let service_to_client = config.service_to_client();
        let client_to_service = config.client_to_service();
        ensure_fifo(&service_to_client)?;
        ensure_fifo(&client_to_service)?;

        let (write_path, listen_path) = match role {
            Role::Service => (service_to_client, client_to_service),
            Role::Client => (client_to_service, service_to_client),
        };

        info!(
            role = %role,
            listen = %listen_path.display(),
            write = %write_path.display(),
            "Command pipe ready"
        );

        Ok(Self {
            role,
            listen_path,
            write_path,
        })
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn listen_path(&self) -> &Path {
        &self.listen_path
    }

    pub fn write_path(&self) -> &Path {
        &self.write_path
    }

    /// Write one message to the peer.
    ///
    /// The FIFO is opened non-blocking, so a peer that is not listening
    /// yields a [`PipeError`] instead of stalling the caller.
    pub fn send(&self, message: &Message) -> Result<(), CellularError> {
        let line = message.to_line()?;

        let mut file = open_writer(&self.write_path)?;
        file.write_all(line.as_bytes())
            .map_err(|e| PipeError::new(&self.write_path, format!("write failed: {}", e)))?;

        debug!(role = %self.role, message = %message, "Message sent");
        Ok(())
    }

    /// Deliver each received line to `on_message` until `stop` is set.
    ///
    /// Blocks in `open` while no writer is connected; call
    /// [`wake_listener`](Self::wake_listener) after setting `stop`.
    pub fn listen<F>(&self, stop: &AtomicBool, mut on_message: F) -> Result<(), PipeError>
    where
        F: FnMut(Result<Message, ParseError>),
    {
        info!(role = %self.role, path = %self.listen_path.display(), "Listening for messages");

        while !stop.load(Ordering::Acquire) {
            let file = File::open(&self.listen_path)
                .map_err(|e| PipeError::new(&self.listen_path, format!("open failed: {}", e)))?;

            for line in BufReader::new(file).lines() {
                if stop.load(Ordering::Acquire) {
                    break;
                }
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => on_message(Message::parse_line(&line)),
                    Err(e) => {
                        warn!(path = %self.listen_path.display(), error = %e, "Read failed, reopening");
                        break;
                    }
                }
            }
        }

        info!(role = %self.role, path = %self.listen_path.display(), "Listener stopped");
        Ok(())
    }

    /// Unblock a listener waiting for a writer on this end's input FIFO
    pub fn wake_listener(&self) {
        match open_writer(&self.listen_path) {
            Ok(_) => debug!(path = %self.listen_path.display(), "Listener woken"),
            Err(e) => debug!(path = %self.listen_path.display(), error = %e, "No listener to wake"),
        }
    }
}

impl MessageSink for CommandPipe {
    fn send(&self, message: &Message) -> Result<(), CellularError> {
        CommandPipe::send(self, message)
    }
}

fn open_writer(path: &Path) -> Result<File, PipeError> {
    OpenOptions::new()
        .write(true)
        .custom_flags(OFlag::O_NONBLOCK.bits())
        .open(path)
        .map_err(|e| {
            if e.raw_os_error() == Some(Errno::ENXIO as i32) {
                PipeError::new(path, "no reader connected")
            } else {
                PipeError::new(path, format!("open failed: {}", e))
            }
        })
}

fn ensure_fifo(path: &Path) -> Result<(), PipeError> {
    match std::fs::metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {
            debug!(path = %path.display(), "Reusing existing FIFO");
            Ok(())
        }
        Ok(_) => Err(PipeError::new(path, "exists and is not a FIFO")),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            match mkfifo(path, Mode::from_bits_truncate(0o666)) {
                Ok(()) | Err(Errno::EEXIST) => {
                    info!(path = %path.display(), "FIFO created");
                    Ok(())
                }
                Err(errno) => Err(PipeError::new(path, format!("mkfifo failed: {}", errno))),
            }
        }
        Err(e) => Err(PipeError::new(path, e.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::sync::Arc;
    use std::time::Duration;

    fn config(dir: &tempfile::TempDir) -> PipeConfig {
        PipeConfig {
            dir: dir.path().to_path_buf(),
        }
    }

    #[test]
    fn test_open_creates_fifos() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = CommandPipe::open(&config(&dir), Role::Service).unwrap();

        for path in [pipe.listen_path(), pipe.write_path()] {
            let meta = std::fs::metadata(path).unwrap();
            assert!(meta.file_type().is_fifo());
        }
        assert!(pipe.write_path().ends_with("command_pipe_s2c"));
        assert!(pipe.listen_path().ends_with("command_pipe_c2s"));

        // Second open reuses them
        let client = CommandPipe::open(&config(&dir), Role::Client).unwrap();
        assert_eq!(client.write_path(), pipe.listen_path());
    }

    #[test]
    fn test_open_rejects_regular_file() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("command_pipe_s2c"), b"").unwrap();
        let err = CommandPipe::open(&config(&dir), Role::Service).unwrap_err();
        assert!(err.reason.contains("not a FIFO"));
    }

    #[test]
    fn test_send_without_reader_fails() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = CommandPipe::open(&config(&dir), Role::Service).unwrap();
        let err = pipe.send(&Message::prompt("hello")).unwrap_err();
        assert_eq!(err.kind_code(), 3);
    }

    #[test]
    fn test_send_rejects_unserializable_message() {
        let dir = tempfile::tempdir().unwrap();
        let pipe = CommandPipe::open(&config(&dir), Role::Service).unwrap();
        let err = pipe.send(&Message::prompt("a\nb")).unwrap_err();
        assert_eq!(err.kind_code(), 2);
    }

    #[test]
    fn test_round_trip_and_wake() {
        let dir = tempfile::tempdir().unwrap();
        let service = CommandPipe::open(&config(&dir), Role::Service).unwrap();
        let client = Arc::new(CommandPipe::open(&config(&dir), Role::Client).unwrap());
        let stop = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel();

        let listener = {
            let client = Arc::clone(&client);
            let stop = Arc::clone(&stop);
            std::thread::spawn(move || {
                client
                    .listen(&stop, |message| {
                        let _ = tx.send(message);
                    })
                    .unwrap();
            })
        };

        let prompt = Message::prompt("+CSQ: 20,0");
        let mut sent = false;
        for _ in 0..100 {
            if service.send(&prompt).is_ok() {
                sent = true;
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        assert!(sent, "listener never opened its FIFO");

        let received = rx.recv_timeout(Duration::from_secs(2)).unwrap();
        assert_eq!(received.unwrap(), prompt);

        stop.store(true, Ordering::Release);
        for _ in 0..100 {
            client.wake_listener();
            if listener.is_finished() {
                break;
            }
            std::thread::sleep(Duration::from_millis(10));
        }
        listener.join().unwrap();
    }
}
