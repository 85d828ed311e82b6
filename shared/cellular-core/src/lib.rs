//! Cellular Core - Shared error kinds and process infrastructure
//!
//! This crate provides:
//! - The error kinds shared by the modem stack and the daemon
//! - Mail configuration loading
//! - Process runtime helpers (shutdown signals, fault backtraces)

pub mod config;
pub mod error;
pub mod service;

pub use config::{MailConfig, MailSettings, MailboxConfig, SenderConfig, DEFAULT_CONFIG_PATH};
pub use error::{
    CellularError, ConfigError, EmailError, ParseError, PipeError, Result, SmsDecodeError,
    UnexpectedResponseError,
};
pub use service::{install_crash_handlers, wait_for_shutdown};
