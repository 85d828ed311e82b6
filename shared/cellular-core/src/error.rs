//! Error types for the cellular UART service

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CellularError>;

/// A verified AT command answered with something other than its expectation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{command} >>> expecting {expected}; got {actual}")]
pub struct UnexpectedResponseError {
    pub command: String,
    pub expected: String,
    pub actual: String,
}

/// Malformed line on the command relay.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct ParseError(pub String);

impl ParseError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// A relay channel could not be created or opened.
#[derive(Error, Debug)]
#[error("pipe {}: {reason}", path.display())]
pub struct PipeError {
    pub path: PathBuf,
    pub reason: String,
}

impl PipeError {
    pub fn new(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

/// Malformed SMS PDU. Carries the offending hex for diagnosis.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot decode PDU {pdu}: {reason}")]
pub struct SmsDecodeError {
    pub pdu: String,
    pub reason: String,
}

impl SmsDecodeError {
    pub fn new(pdu: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            pdu: pdu.into(),
            reason: reason.into(),
        }
    }
}

/// Mail delivery failures.
///
/// `NotConfigured` and `Compose` happen before anything is transmitted;
/// `Transport` is a failure of the SMTP exchange itself.
#[derive(Error, Debug)]
pub enum EmailError {
    #[error("mail is not configured: {0}")]
    NotConfigured(String),

    #[error("cannot compose mail: {0}")]
    Compose(String),

    #[error("mail transport failed{}: {description}", code.as_deref().map(|c| format!(" with code {c}")).unwrap_or_default())]
    Transport {
        code: Option<String>,
        description: String,
    },
}

impl EmailError {
    /// True when the failure happened before any byte reached the mail server.
    pub fn is_before_transmission(&self) -> bool {
        !matches!(self, Self::Transport { .. })
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("invalid {key}: {reason}")]
    Invalid { key: String, reason: String },

    #[error("missing {0}")]
    Missing(String),
}

#[derive(Error, Debug)]
pub enum CellularError {
    #[error("Unexpected AT response: {0}")]
    UnexpectedResponse(#[from] UnexpectedResponseError),

    #[error("Parser error: {0}")]
    Parser(#[from] ParseError),

    #[error("Pipe error: {0}")]
    Pipe(#[from] PipeError),

    #[error("SMS decode error: {0}")]
    SmsDecode(#[from] SmsDecodeError),

    #[error("Email error: {0}")]
    Email(#[from] EmailError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CellularError {
    /// Numeric kind reported in logs; 0 for kinds outside the protocol set.
    pub fn kind_code(&self) -> u8 {
        match self {
            Self::UnexpectedResponse(_) => 1,
            Self::Parser(_) => 2,
            Self::Pipe(_) => 3,
            Self::SmsDecode(_) => 4,
            Self::Email(_) => 5,
            Self::Config(_) | Self::Io(_) => 0,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Self::UnexpectedResponse(_) => "UNEXPECTED_AT_RESPONSE",
            Self::Parser(_) => "PARSER_ERROR",
            Self::Pipe(_) => "PIPE_ERROR",
            Self::SmsDecode(_) => "SMS_PDU_ERROR",
            Self::Email(_) => "EMAIL_ERROR",
            Self::Config(_) => "CONFIG_ERROR",
            Self::Io(_) => "IO_ERROR",
        }
    }
}
