//! In-memory serial channel driven by a script of modem replies

use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::io;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::{ReadOutcome, SerialChannel, SerialWrite};

#[derive(Debug, Default)]
struct ScriptState {
    rx: VecDeque<u8>,
    tx: Vec<u8>,
    /// Command line and the bytes the modem sends back once it is written
    replies: VecDeque<(String, Vec<u8>)>,
    closed: bool,
    read_error: Option<io::ErrorKind>,
    write_error: Option<io::ErrorKind>,
}

impl ScriptState {
    fn record_write(&mut self, data: &[u8]) -> io::Result<()> {
        if let Some(kind) = self.write_error {
            return Err(io::Error::new(kind, "scripted write failure"));
        }
        self.tx.extend_from_slice(data);

        let text = String::from_utf8_lossy(data);
        for line in text.split("\r\n").filter(|l| !l.is_empty()) {
            if let Some(pos) = self.replies.iter().position(|(cmd, _)| cmd == line) {
                if let Some((_, reply)) = self.replies.remove(pos) {
                    self.rx.extend(reply);
                }
            }
        }
        Ok(())
    }
}

/// A modem stand-in for tests and dry runs.
///
/// Replies queued with [`reply_to`](Self::reply_to) are released into the
/// receive buffer when the matching command line is written; unsolicited
/// bytes are added with [`inject`](Self::inject). Clones share state.
#[derive(Debug, Clone, Default)]
pub struct ScriptedChannel {
    shared: Arc<(Mutex<ScriptState>, Condvar)>,
}

impl ScriptedChannel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `command` with `reply` the next time it is written
    pub fn reply_to(&self, command: &str, reply: &[u8]) {
        self.shared
            .0
            .lock()
            .replies
            .push_back((command.to_string(), reply.to_vec()));
    }

    /// Make bytes available to the reader
    pub fn inject(&self, data: &[u8]) {
        let (lock, cvar) = &*self.shared;
        lock.lock().rx.extend(data);
        cvar.notify_all();
    }

    /// Report end of stream once the receive buffer is drained
    pub fn close(&self) {
        let (lock, cvar) = &*self.shared;
        lock.lock().closed = true;
        cvar.notify_all();
    }

    pub fn fail_reads(&self, kind: io::ErrorKind) {
        let (lock, cvar) = &*self.shared;
        lock.lock().read_error = Some(kind);
        cvar.notify_all();
    }

    pub fn fail_writes(&self, kind: io::ErrorKind) {
        self.shared.0.lock().write_error = Some(kind);
    }

    /// Every byte written so far
    pub fn written(&self) -> Vec<u8> {
        self.shared.0.lock().tx.clone()
    }

    /// Written bytes split into command lines
    pub fn written_lines(&self) -> Vec<String> {
        String::from_utf8_lossy(&self.written())
            .split("\r\n")
            .filter(|l| !l.is_empty())
            .map(str::to_string)
            .collect()
    }

    /// Replies still waiting for their command
    pub fn pending_replies(&self) -> usize {
        self.shared.0.lock().replies.len()
    }

    pub fn writer(&self) -> ScriptedWriter {
        ScriptedWriter {
            shared: Arc::clone(&self.shared),
        }
    }

    fn write_shared(shared: &(Mutex<ScriptState>, Condvar), data: &[u8]) -> io::Result<()> {
        let (lock, cvar) = shared;
        lock.lock().record_write(data)?;
        cvar.notify_all();
        Ok(())
    }
}

impl SerialChannel for ScriptedChannel {
    fn clear_input(&mut self) -> io::Result<()> {
        self.shared.0.lock().rx.clear();
        Ok(())
    }

    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        Self::write_shared(&self.shared, data)
    }

    fn read_byte(&mut self, timeout: Duration) -> ReadOutcome {
        let (lock, cvar) = &*self.shared;
        let deadline = Instant::now() + timeout;
        let mut state = lock.lock();

        loop {
            if let Some(kind) = state.read_error {
                return ReadOutcome::Error(io::Error::new(kind, "scripted read failure"));
            }
            if let Some(byte) = state.rx.pop_front() {
                return ReadOutcome::Byte(byte);
            }
            if state.closed {
                return ReadOutcome::Closed;
            }
            if cvar.wait_until(&mut state, deadline).timed_out() && state.rx.is_empty() {
                return ReadOutcome::Timeout;
            }
        }
    }
}

/// Write handle sharing a [`ScriptedChannel`]'s state
#[derive(Debug, Clone)]
pub struct ScriptedWriter {
    shared: Arc<(Mutex<ScriptState>, Condvar)>,
}

impl SerialWrite for ScriptedWriter {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()> {
        ScriptedChannel::write_shared(&self.shared, data)
    }
}
