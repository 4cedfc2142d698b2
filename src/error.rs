//! Typed error handling for campaigns.
//!
//! Three layers, matching how far an error is allowed to travel:
//! - [`DeliveryError`]: one failed attempt. Never leaves the retry scheduler
//!   except as text inside an outcome.
//! - [`ExhaustedRetriesError`]: every attempt for one recipient failed.
//!   Recorded as a failure outcome, never aborts the campaign.
//! - [`ConfigurationError`]: the campaign cannot start. The only error that
//!   aborts a run, always before the first send.

use std::path::PathBuf;

use thiserror::Error;

use crate::{client::ClientError, types::Recipient};

/// Failure of a single delivery attempt against a single relay.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeliveryError {
    /// Could not reach the relay, or it dropped the connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A connect or command step exceeded its timeout.
    #[error("Timed out: {0}")]
    Timeout(String),

    /// TLS was required but could not be negotiated.
    #[error("TLS negotiation failed: {0}")]
    Tls(String),

    /// The relay refused the credentials. Carries the relay's own wording.
    #[error("{0}")]
    Authentication(String),

    /// The relay answered a command with a 4xx or 5xx reply.
    #[error("{code} {message}")]
    Rejected { code: u16, message: String },

    /// The relay spoke something that is not SMTP.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

impl DeliveryError {
    /// Returns `true` when a later attempt could plausibly succeed.
    ///
    /// Informational only: the scheduler retries every failure.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        match self {
            Self::Connection(_) | Self::Timeout(_) => true,
            Self::Rejected { code, .. } => *code >= 400 && *code < 500,
            Self::Tls(_) | Self::Authentication(_) | Self::Protocol(_) => false,
        }
    }

    /// Short machine-readable name used in audit events.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Connection(_) => "connection",
            Self::Timeout(_) => "timeout",
            Self::Tls(_) => "tls",
            Self::Authentication(_) => "authentication",
            Self::Rejected { .. } => "rejected",
            Self::Protocol(_) => "protocol",
        }
    }
}

impl From<ClientError> for DeliveryError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::Io(e) => Self::Connection(format!("I/O error: {e}")),
            ClientError::ConnectionClosed => {
                Self::Connection("Connection closed unexpectedly".to_string())
            }
            ClientError::TlsError(msg) => Self::Tls(msg),
            ClientError::UnexpectedResponse { code, message } => Self::Protocol(format!(
                "Unexpected SMTP response: {code} {message}"
            )),
            ClientError::ParseError(msg) => Self::Protocol(format!("SMTP parse error: {msg}")),
            ClientError::Utf8Error(e) => Self::Protocol(format!("UTF-8 decoding error: {e}")),
        }
    }
}

/// Every attempt for one recipient failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Delivery to {recipient} failed after {attempts} attempts: {last_error}")]
pub struct ExhaustedRetriesError {
    pub recipient: Recipient,
    pub attempts: u32,
    /// Username of the relay used for the final attempt.
    pub relay_username: String,
    /// Only the final attempt's error is kept.
    pub last_error: DeliveryError,
}

/// Fatal pre-flight problems. Nothing is sent when one of these is raised.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigurationError {
    #[error("No relay credentials configured (expected lines of server|port|username|password)")]
    NoRelays,

    #[error("No recipients configured")]
    NoRecipients,

    #[error("Invalid setting {field}: {reason}")]
    InvalidSetting { field: &'static str, reason: String },
}

/// Campaign-level errors returned by [`crate::CampaignRunner::run`].
#[derive(Debug, Error)]
pub enum CampaignError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

/// Why a line of the relay file was skipped.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LineError {
    #[error("expected 4 '|'-separated fields, found {found}")]
    MissingFields { found: usize },

    #[error("invalid port '{value}'")]
    InvalidPort { value: String },
}

/// Errors reading the campaign's input files.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse configuration {}: {reason}", path.display())]
    Config { path: PathBuf, reason: String },
}
