//! Transaction engine and line splitter

use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::{command_line, ReadOutcome, SerialChannel};

/// Terminal state of one AT transaction
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionOutcome {
    /// `OK` seen; text collected before it
    Complete(String),
    /// The modem answered `ERROR`, `+CME ERROR` or `+CMS ERROR`
    ModemError(String),
    Timeout { partial: String },
    Closed,
    Error(String),
}

/// Step reported by [`ResponseScanner::push`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    Continue,
    Complete,
    ModemError,
}

/// Collects response bytes up to the `OK` terminator.
///
/// An `O` is held back until the next byte decides: `K` completes the
/// response, anything else releases both bytes into the buffer. Carriage
/// returns are dropped.
#[derive(Debug, Default)]
pub struct ResponseScanner {
    buffer: Vec<u8>,
    held: bool,
    line_start: usize,
}

impl ResponseScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, byte: u8) -> ScanStep {
        if self.held {
            self.held = false;
            if byte == b'K' {
                return ScanStep::Complete;
            }
            self.buffer.push(b'O');
            return self.append(byte);
        }

        if byte == b'O' {
            self.held = true;
            return ScanStep::Continue;
        }
        self.append(byte)
    }

    fn append(&mut self, byte: u8) -> ScanStep {
        match byte {
            b'\r' => ScanStep::Continue,
            b'\n' => {
                let failed = is_error_line(&self.buffer[self.line_start..]);
                self.buffer.push(b'\n');
                self.line_start = self.buffer.len();
                if failed {
                    ScanStep::ModemError
                } else {
                    ScanStep::Continue
                }
            }
            _ => {
                self.buffer.push(byte);
                ScanStep::Continue
            }
        }
    }

    /// Collected text so far. A held `O` is not included.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    pub fn into_text(self) -> String {
        match String::from_utf8(self.buffer) {
            Ok(text) => text,
            Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
        }
    }
}

fn is_error_line(line: &[u8]) -> bool {
    let line = String::from_utf8_lossy(line);
    let line = line.trim();
    line == "ERROR" || line.starts_with("+CME ERROR") || line.starts_with("+CMS ERROR")
}

/// Send `command` and collect its response within `timeout`.
///
/// Each byte read is bounded by the remaining budget.
pub fn run_transaction<C: SerialChannel + ?Sized>(
    channel: &mut C,
    command: &str,
    timeout: Duration,
) -> TransactionOutcome {
    if let Err(e) = channel.clear_input() {
        return TransactionOutcome::Error(format!("flush failed: {}", e));
    }
    if let Err(e) = channel.write_all(command_line(command).as_bytes()) {
        return TransactionOutcome::Error(format!("write failed: {}", e));
    }

    let deadline = Instant::now() + timeout;
    let mut scanner = ResponseScanner::new();

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return TransactionOutcome::Timeout {
                partial: scanner.into_text(),
            };
        }

        match channel.read_byte(remaining) {
            ReadOutcome::Byte(byte) => match scanner.push(byte) {
                ScanStep::Continue => {}
                ScanStep::Complete => return TransactionOutcome::Complete(scanner.into_text()),
                ScanStep::ModemError => {
                    return TransactionOutcome::ModemError(scanner.into_text())
                }
            },
            ReadOutcome::Timeout => {
                return TransactionOutcome::Timeout {
                    partial: scanner.into_text(),
                }
            }
            ReadOutcome::Closed => return TransactionOutcome::Closed,
            ReadOutcome::Error(e) => return TransactionOutcome::Error(e.to_string()),
        }
    }
}

/// Send `command` and return the text before `OK`, or `None` when the
/// transaction did not complete. Each failure mode is logged.
#[instrument(level = "debug", skip(channel))]
pub fn transact<C: SerialChannel + ?Sized>(
    channel: &mut C,
    command: &str,
    timeout: Duration,
) -> Option<String> {
    match run_transaction(channel, command, timeout) {
        TransactionOutcome::Complete(response) => {
            debug!(command, response = %response.trim(), "AT command complete");
            Some(response)
        }
        TransactionOutcome::ModemError(response) => {
            warn!(command, response = %response.trim(), "Modem rejected AT command");
            None
        }
        TransactionOutcome::Timeout { partial } => {
            warn!(
                command,
                timeout_ms = timeout.as_millis() as u64,
                partial = %partial.trim(),
                "AT command timed out"
            );
            None
        }
        TransactionOutcome::Closed => {
            warn!(command, "Serial line closed during AT command");
            None
        }
        TransactionOutcome::Error(reason) => {
            warn!(command, reason = %reason, "Serial error during AT command");
            None
        }
    }
}

/// Event produced by [`LineReader::next_event`]
#[derive(Debug)]
pub enum LineEvent {
    /// A line terminated by CR LF, terminator stripped
    Line(String),
    /// Nothing arrived within the poll slice
    Idle,
    Closed,
    Failed(std::io::Error),
}

/// Splits the serial stream into CR LF terminated lines
#[derive(Debug, Default)]
pub struct LineReader {
    buffer: Vec<u8>,
    saw_cr: bool,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one byte; returns the line when it completes
    pub fn feed(&mut self, byte: u8) -> Option<String> {
        match byte {
            b'\r' => {
                self.saw_cr = true;
                None
            }
            b'\n' if self.saw_cr => {
                self.saw_cr = false;
                let line = std::mem::take(&mut self.buffer);
                Some(String::from_utf8_lossy(&line).into_owned())
            }
            _ => {
                self.saw_cr = false;
                self.buffer.push(byte);
                None
            }
        }
    }

    /// Read until a line completes, the slice elapses with no byte, or the
    /// channel ends.
    pub fn next_event<C: SerialChannel + ?Sized>(
        &mut self,
        channel: &mut C,
        slice: Duration,
    ) -> LineEvent {
        loop {
            match channel.read_byte(slice) {
                ReadOutcome::Byte(byte) => {
                    if let Some(line) = self.feed(byte) {
                        return LineEvent::Line(line);
                    }
                }
                ReadOutcome::Timeout => return LineEvent::Idle,
                ReadOutcome::Closed => return LineEvent::Closed,
                ReadOutcome::Error(e) => return LineEvent::Failed(e),
            }
        }
    }
}
