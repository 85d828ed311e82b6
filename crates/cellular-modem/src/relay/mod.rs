//! Command relay between the daemon and a front-end process
//!
//! One message per line: a numeric type tag immediately followed by the
//! payload. Tag `1` is a command, optionally carrying its expected response
//! after the first `;`. Tag `2` is a prompt whose payload is taken verbatim.

pub mod pipe;

use cellular_core::{CellularError, ParseError, UnexpectedResponseError};
use std::fmt;
use tracing::{debug, info};

pub use pipe::CommandPipe;

pub const TAG_COMMAND: u32 = 1;
pub const TAG_PROMPT: u32 = 2;

/// Which end of the relay a process plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// The modem daemon
    Service,
    /// The front-end
    Client,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Service => f.write_str("service"),
            Role::Client => f.write_str("client"),
        }
    }
}

/// An AT command submitted by the front-end
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Command {
    pub command: String,
    /// Exact response line the command must produce
    pub expected: Option<String>,
}

impl Command {
    pub fn new(command: impl Into<String>, expected: Option<String>) -> Self {
        Self {
            command: command.into(),
            expected,
        }
    }

    /// Check a response line against the expectation, if any
    pub fn verify(&self, response: &str) -> Result<(), UnexpectedResponseError> {
        match &self.expected {
            None => {
                debug!(command = %self.command, response, "No expectation set");
                Ok(())
            }
            Some(expected) if expected == response => {
                info!(command = %self.command, response, "AT command verified");
                Ok(())
            }
            Some(expected) => Err(UnexpectedResponseError {
                command: self.command.clone(),
                expected: expected.clone(),
                actual: response.to_string(),
            }),
        }
    }
}

/// A relay message
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Command(Command),
    Prompt(String),
}

impl Message {
    pub fn command(command: impl Into<String>, expected: Option<&str>) -> Self {
        Self::Command(Command::new(command, expected.map(str::to_string)))
    }

    pub fn prompt(text: impl Into<String>) -> Self {
        Self::Prompt(text.into())
    }

    pub fn tag(&self) -> u32 {
        match self {
            Self::Command(_) => TAG_COMMAND,
            Self::Prompt(_) => TAG_PROMPT,
        }
    }

    /// Serialize to one newline-terminated line
    pub fn to_line(&self) -> Result<String, ParseError> {
        let payload = match self {
            Self::Command(Command { command, .. }) if command.contains(';') => {
                return Err(ParseError::new(format!(
                    "command {:?} contains the expectation separator",
                    command
                )));
            }
            Self::Command(Command {
                command,
                expected: Some(expected),
            }) => format!("{};{}", command, expected),
            Self::Command(Command { command, .. }) => command.clone(),
            Self::Prompt(text) => text.clone(),
        };

        if payload.contains('\n') {
            return Err(ParseError::new(format!(
                "payload {:?} contains a newline",
                payload
            )));
        }
        // The tag has no separator, so a leading digit would be read as part of it
        if payload.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(ParseError::new(format!(
                "payload {:?} starts with a digit",
                payload
            )));
        }
        Ok(format!("{}{}\n", self.tag(), payload))
    }

    /// Parse one line, with or without its trailing newline
    pub fn parse_line(line: &str) -> Result<Self, ParseError> {
        let line = line.strip_suffix('\n').unwrap_or(line);
        let line = line.strip_suffix('\r').unwrap_or(line);
        let body = line.trim_start();

        let digits = body.len() - body.trim_start_matches(|c: char| c.is_ascii_digit()).len();
        if digits == 0 {
            return Err(ParseError::new(format!(
                "missing message type in {:?}",
                line
            )));
        }
        let (tag, payload) = body.split_at(digits);
        let tag: u32 = tag
            .parse()
            .map_err(|_| ParseError::new(format!("message type {} out of range", tag)))?;

        match tag {
            TAG_COMMAND => Ok(match payload.split_once(';') {
                Some((command, expected)) => Self::command(command, Some(expected)),
                None => Self::command(payload, None),
            }),
            TAG_PROMPT => Ok(Self::prompt(payload)),
            0 => Err(ParseError::new("message type 0 (unknown)")),
            other => Err(ParseError::new(format!("unknown message type {}", other))),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Command(Command {
                command,
                expected: Some(expected),
            }) => write!(f, "AT COMMAND {{{};{}}}", command, expected),
            Self::Command(Command { command, .. }) => write!(f, "AT COMMAND {{{}}}", command),
            Self::Prompt(text) => write!(f, "PROMPT {{{}}}", text),
        }
    }
}

/// Destination for outbound relay messages
pub trait MessageSink: Send + Sync {
    fn send(&self, message: &Message) -> Result<(), CellularError>;
}
