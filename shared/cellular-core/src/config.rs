//! Mail configuration loading
//!
//! The mail collaborator is optional: anything wrong with the file degrades
//! to [`MailSettings::Invalid`] so the daemon keeps running and only logs
//! decoded messages.

use serde::Deserialize;
use std::fmt;
use std::path::Path;
use tracing::{info, warn};

/// Well-known location of the mail configuration file.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/cellular_uart_service/config.yaml";

/// A display name and address pair.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailboxConfig {
    #[serde(default)]
    pub name: Option<String>,
    pub email: String,
}

impl MailboxConfig {
    /// Mailbox formatted as `Name <email>`, or the bare address without a name.
    pub fn mailbox(&self) -> String {
        match self.name.as_deref().map(str::trim) {
            Some(name) if !name.is_empty() => format!("{} <{}>", name, self.email),
            _ => self.email.clone(),
        }
    }
}

impl fmt::Display for MailboxConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mailbox())
    }
}

/// Sending account: mailbox plus SMTP server URI and password.
#[derive(Clone, PartialEq, Eq, Deserialize)]
pub struct SenderConfig {
    #[serde(flatten)]
    pub mailbox: MailboxConfig,
    pub server: String,
    pub password: String,
}

impl fmt::Debug for SenderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SenderConfig")
            .field("mailbox", &self.mailbox)
            .field("server", &self.server)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MailConfig {
    pub sender: SenderConfig,
    pub receiver: MailboxConfig,
}

impl MailConfig {
    fn validate(self) -> Result<Self, String> {
        let required = [
            ("sender.email", &self.sender.mailbox.email),
            ("sender.server", &self.sender.server),
            ("sender.password", &self.sender.password),
            ("receiver.email", &self.receiver.email),
        ];
        for (key, value) in required {
            if value.trim().is_empty() {
                return Err(format!("{key} is empty"));
            }
        }
        Ok(self)
    }
}

/// Result of loading the mail configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MailSettings {
    Valid(MailConfig),
    /// Configuration absent or malformed; carries the reason.
    Invalid(String),
}

impl MailSettings {
    /// Load from `path`. Never fails; problems are logged and degrade to `Invalid`.
    pub fn load(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        let settings = match std::fs::read_to_string(path) {
            Ok(text) => Self::parse(&text),
            Err(e) => Self::Invalid(format!("cannot read {}: {}", path.display(), e)),
        };

        match &settings {
            Self::Valid(config) => info!(
                path = %path.display(),
                sender = %config.sender.mailbox,
                receiver = %config.receiver,
                "Mail configuration loaded"
            ),
            Self::Invalid(reason) => warn!(
                path = %path.display(),
                reason = %reason,
                "Mail configuration invalid, decoded messages will only be logged"
            ),
        }
        settings
    }

    /// Parse YAML text without touching the filesystem.
    pub fn parse(text: &str) -> Self {
        match serde_yaml::from_str::<MailConfig>(text) {
            Ok(config) => match config.validate() {
                Ok(config) => Self::Valid(config),
                Err(reason) => Self::Invalid(reason),
            },
            Err(e) => Self::Invalid(e.to_string()),
        }
    }

    pub fn is_valid(&self) -> bool {
        matches!(self, Self::Valid(_))
    }

    pub fn config(&self) -> Option<&MailConfig> {
        match self {
            Self::Valid(config) => Some(config),
            Self::Invalid(_) => None,
        }
    }
}
