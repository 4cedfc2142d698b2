//! Shared value types for a campaign

use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};

use crate::error::ConfigurationError;

/// A recipient email address.
///
/// Addresses are taken as-is from the recipient list; duplicates are allowed
/// and each occurrence gets its own delivery.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Recipient(String);

impl Recipient {
    #[must_use]
    pub fn new(address: impl Into<String>) -> Self {
        Self(address.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Recipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Recipient {
    fn from(address: &str) -> Self {
        Self::new(address)
    }
}

impl From<String> for Recipient {
    fn from(address: String) -> Self {
        Self(address)
    }
}

/// Subject and HTML body, shared read-only by every worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageTemplate {
    pub subject_line: String,
    pub html_body: String,
}

impl MessageTemplate {
    #[must_use]
    pub fn new(subject_line: impl Into<String>, html_body: impl Into<String>) -> Self {
        Self {
            subject_line: subject_line.into(),
            html_body: html_body.into(),
        }
    }
}

/// SMTP operation timeout configuration
///
/// Every network step of a delivery attempt is bounded so a stalled relay
/// only costs one attempt, never a stuck worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpTimeouts {
    /// Timeout for TCP connect (and the implicit TLS handshake)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_connect_timeout")]
    pub connect_secs: u64,

    /// Timeout for the greeting and each command reply (EHLO, STARTTLS,
    /// AUTH, MAIL FROM, RCPT TO, DATA)
    ///
    /// Default: 30 seconds
    #[serde(default = "default_command_timeout")]
    pub command_secs: u64,

    /// Timeout for transmitting the message content
    ///
    /// Default: 120 seconds (2 minutes)
    #[serde(default = "default_data_timeout")]
    pub data_secs: u64,

    /// Timeout for QUIT command
    ///
    /// Default: 10 seconds
    #[serde(default = "default_quit_timeout")]
    pub quit_secs: u64,
}

impl Default for SmtpTimeouts {
    fn default() -> Self {
        Self {
            connect_secs: default_connect_timeout(),
            command_secs: default_command_timeout(),
            data_secs: default_data_timeout(),
            quit_secs: default_quit_timeout(),
        }
    }
}

impl SmtpTimeouts {
    /// Every timeout must be at least one second.
    ///
    /// # Errors
    ///
    /// [`ConfigurationError::InvalidSetting`] naming the first zero timeout.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let timeouts = [
            ("smtp.timeouts.connect_secs", self.connect_secs),
            ("smtp.timeouts.command_secs", self.command_secs),
            ("smtp.timeouts.data_secs", self.data_secs),
            ("smtp.timeouts.quit_secs", self.quit_secs),
        ];

        match timeouts.into_iter().find(|(_, secs)| *secs == 0) {
            Some((field, _)) => Err(ConfigurationError::InvalidSetting {
                field,
                reason: "must be at least 1 second".to_string(),
            }),
            None => Ok(()),
        }
    }

    #[must_use]
    pub const fn connect(&self) -> Duration {
        Duration::from_secs(self.connect_secs)
    }

    #[must_use]
    pub const fn command(&self) -> Duration {
        Duration::from_secs(self.command_secs)
    }

    #[must_use]
    pub const fn data(&self) -> Duration {
        Duration::from_secs(self.data_secs)
    }

    #[must_use]
    pub const fn quit(&self) -> Duration {
        Duration::from_secs(self.quit_secs)
    }
}

const fn default_connect_timeout() -> u64 {
    30
}

const fn default_command_timeout() -> u64 {
    30
}

const fn default_data_timeout() -> u64 {
    120
}

const fn default_quit_timeout() -> u64 {
    10
}
