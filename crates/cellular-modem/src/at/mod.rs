//! AT command layer
//!
//! The serial line is abstracted as a byte channel with a bounded
//! single-byte read. [`engine`] runs request/response transactions and
//! splits the steady-state stream into lines; [`classify`] sorts those lines
//! into unsolicited notifications and command responses.

pub mod classify;
pub mod engine;
pub mod port;
pub mod scripted;

use std::io;
use std::time::Duration;

pub use classify::{classify_line, message_body, LineKind};
pub use engine::{transact, LineEvent, LineReader, ResponseScanner, TransactionOutcome};
pub use port::{ModemPort, PortWriter};
pub use scripted::{ScriptedChannel, ScriptedWriter};

/// Result of a bounded single-byte read
#[derive(Debug)]
pub enum ReadOutcome {
    Byte(u8),
    /// Nothing arrived within the timeout
    Timeout,
    /// End of stream
    Closed,
    Error(io::Error),
}

/// Reading side of the serial line, owned by the main loop
pub trait SerialChannel: Send {
    /// Discard anything received but not yet read
    fn clear_input(&mut self) -> io::Result<()>;

    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;

    /// Wait up to `timeout` for one byte
    fn read_byte(&mut self, timeout: Duration) -> ReadOutcome;
}

/// Write-only handle on the serial line, used by the relay listener
pub trait SerialWrite: Send {
    fn write_all(&mut self, data: &[u8]) -> io::Result<()>;
}

/// Frame an AT command with its CRLF terminator
pub fn command_line(command: &str) -> String {
    let mut line = String::with_capacity(command.len() + crate::CRLF.len());
    line.push_str(command);
    line.push_str(crate::CRLF);
    line
}
