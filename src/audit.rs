//! Audit trail for campaign events
//!
//! Every event is a structured `tracing` event carrying an `event` field, so
//! the trail can be filtered out of the regular log stream.
//!
//! ## Audit Events
//!
//! - `CampaignStarted`: pre-flight passed, workers are about to launch
//! - `DeliveryAttempt`: one attempt against one relay
//! - `DeliverySuccess`: terminal success for a recipient
//! - `DeliveryFailure`: terminal failure after exhausting retries
//! - `CampaignFinished`: every recipient has an outcome
//!
//! ## Redaction
//!
//! Recipient addresses can be redacted (local part replaced) with
//! `redact_recipients`.

use serde::{Deserialize, Serialize};

/// Audit logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Emit audit events
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Replace the local part of recipient addresses with `[REDACTED]`
    #[serde(default)]
    pub redact_recipients: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            redact_recipients: false,
        }
    }
}

const fn default_true() -> bool {
    true
}

/// Redact email address if redaction is enabled
#[must_use]
pub fn redact_email(email: &str, redact: bool) -> String {
    if redact {
        // Keep domain but redact local part
        if let Some((_, domain)) = email.split_once('@') {
            format!("[REDACTED]@{domain}")
        } else {
            "[REDACTED]".to_string()
        }
    } else {
        email.to_string()
    }
}

/// Emits audit events according to an [`AuditConfig`].
///
/// Cheap to clone; handed to every worker alongside the result log.
#[derive(Debug, Clone, Default)]
pub struct Auditor {
    config: AuditConfig,
}

impl Auditor {
    #[must_use]
    pub const fn new(config: AuditConfig) -> Self {
        Self { config }
    }

    #[must_use]
    pub const fn disabled() -> Self {
        Self {
            config: AuditConfig {
                enabled: false,
                redact_recipients: false,
            },
        }
    }

    #[must_use]
    pub const fn config(&self) -> &AuditConfig {
        &self.config
    }

    fn recipient(&self, recipient: &str) -> String {
        redact_email(recipient, self.config.redact_recipients)
    }

    pub fn campaign_started(&self, recipients: usize, relays: usize, max_workers: usize) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "CampaignStarted",
            recipient_count = recipients,
            relay_count = relays,
            max_workers = max_workers,
            "Audit: Campaign started"
        );
    }

    /// # Fields
    /// - `recipient`: redacted if configured
    /// - `relay`: relay username used for this attempt
    /// - `delivery_attempt`: attempt number (1-based)
    pub fn delivery_attempt(&self, recipient: &str, relay: &str, attempt: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::DEBUG,
            event = "DeliveryAttempt",
            recipient = %self.recipient(recipient),
            relay = %relay,
            delivery_attempt = attempt,
            "Audit: Delivery attempt"
        );
    }

    pub fn delivery_success(&self, recipient: &str, relay: &str, attempt: u32, duration_ms: u128) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "DeliverySuccess",
            recipient = %self.recipient(recipient),
            relay = %relay,
            delivery_attempt = attempt,
            duration_ms = duration_ms,
            "Audit: Delivery successful"
        );
    }

    pub fn delivery_failure(&self, recipient: &str, error: &str, kind: &str, attempts: u32) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::WARN,
            event = "DeliveryFailure",
            recipient = %self.recipient(recipient),
            error = %error,
            error_kind = %kind,
            delivery_attempt = attempts,
            "Audit: Delivery failed"
        );
    }

    pub fn campaign_finished(&self, successful: usize, failed: usize, elapsed_secs: f64) {
        if !self.config.enabled {
            return;
        }

        tracing::event!(
            tracing::Level::INFO,
            event = "CampaignFinished",
            successful = successful,
            failed = failed,
            elapsed_secs = elapsed_secs,
            "Audit: Campaign finished"
        );
    }
}
