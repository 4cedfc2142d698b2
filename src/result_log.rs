//! Terminal outcomes and their aggregation

use std::{path::Path, time::Duration};

use chrono::{DateTime, SecondsFormat, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer, ser::SerializeStruct};

use crate::{error::ExhaustedRetriesError, types::Recipient};

/// Result of one delivery attempt.
///
/// Only the terminal attempt for each recipient is kept in the [`ResultLog`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptOutcome {
    pub recipient: Recipient,
    /// Relay used for this attempt.
    pub relay_username: String,
    /// 1-indexed. For a terminal failure this is the total attempt count.
    pub attempt_number: u32,
    pub succeeded: bool,
    pub error_detail: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AttemptOutcome {
    #[must_use]
    pub fn success(recipient: Recipient, relay_username: impl Into<String>, attempt_number: u32) -> Self {
        Self {
            recipient,
            relay_username: relay_username.into(),
            attempt_number,
            succeeded: true,
            error_detail: None,
            timestamp: Utc::now(),
        }
    }

    #[must_use]
    pub fn failure(recipient: Recipient, relay_username: impl Into<String>, attempts: u32, error: impl Into<String>) -> Self {
        Self {
            recipient,
            relay_username: relay_username.into(),
            attempt_number: attempts,
            succeeded: false,
            error_detail: Some(error.into()),
            timestamp: Utc::now(),
        }
    }
}

impl From<ExhaustedRetriesError> for AttemptOutcome {
    fn from(error: ExhaustedRetriesError) -> Self {
        Self::failure(
            error.recipient,
            error.relay_username,
            error.attempts,
            error.last_error.to_string(),
        )
    }
}

/// Serialised in the result file's shape: success records name the relay
/// account and the winning `attempt`, failure records carry the `error` and
/// the total `attempts`.
impl Serialize for AttemptOutcome {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("AttemptOutcome", 5)?;
        state.serialize_field(
            "timestamp",
            &self.timestamp.to_rfc3339_opts(SecondsFormat::Micros, true),
        )?;
        if self.succeeded {
            state.serialize_field("status", "success")?;
            state.serialize_field("recipient", &self.recipient)?;
            state.serialize_field("smtp_account", &self.relay_username)?;
            state.serialize_field("attempt", &self.attempt_number)?;
        } else {
            state.serialize_field("status", "failed")?;
            state.serialize_field("recipient", &self.recipient)?;
            state.serialize_field("error", &self.error_detail)?;
            state.serialize_field("attempts", &self.attempt_number)?;
        }
        state.end()
    }
}

/// Counts derived from a log snapshot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CampaignSummary {
    pub success_count: usize,
    pub failure_count: usize,
    pub success_rate_percent: f64,
}

impl CampaignSummary {
    /// Success rate with two decimals, e.g. `"66.67%"`.
    #[must_use]
    pub fn success_rate(&self) -> String {
        format!("{:.2}%", self.success_rate_percent)
    }
}

/// Append-only, lock-guarded collection of terminal outcomes.
///
/// Shared between workers behind an `Arc`; the mutex is held only for the
/// push itself.
#[derive(Debug, Default)]
pub struct ResultLog {
    outcomes: Mutex<Vec<AttemptOutcome>>,
}

impl ResultLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: AttemptOutcome) {
        self.outcomes.lock().push(outcome);
    }

    /// Outcomes in insertion order.
    #[must_use]
    pub fn snapshot(&self) -> Vec<AttemptOutcome> {
        self.outcomes.lock().clone()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.outcomes.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.outcomes.lock().is_empty()
    }

    #[must_use]
    pub fn summary(&self, total_recipients: usize) -> CampaignSummary {
        summarize(&self.snapshot(), total_recipients)
    }
}

fn summarize(outcomes: &[AttemptOutcome], total_recipients: usize) -> CampaignSummary {
    let success_count = outcomes.iter().filter(|o| o.succeeded).count();
    let failure_count = outcomes.len() - success_count;

    #[allow(
        clippy::cast_precision_loss,
        reason = "recipient counts are far below f64's exact integer range"
    )]
    let success_rate_percent = if total_recipients == 0 {
        0.0
    } else {
        success_count as f64 / total_recipients as f64 * 100.0
    };

    CampaignSummary {
        success_count,
        failure_count,
        success_rate_percent,
    }
}

/// Header of the result file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignMetadata {
    pub start_time: String,
    pub total_recipients: usize,
    #[serde(rename = "smtp_accounts_used")]
    pub relays_available: usize,
    pub success_rate: String,
    pub successful: usize,
    pub failed: usize,
    pub elapsed_secs: f64,
}

/// The campaign's final artifact.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CampaignResult {
    pub metadata: CampaignMetadata,
    #[serde(rename = "results")]
    pub outcomes: Vec<AttemptOutcome>,
    /// Set once the result has been written to the output file.
    #[serde(skip)]
    pub persisted: bool,
}

impl CampaignResult {
    /// Builds the result from a finished log.
    #[must_use]
    pub fn from_log(
        log: &ResultLog,
        total_recipients: usize,
        relays_available: usize,
        started_at: DateTime<Utc>,
        elapsed: Duration,
    ) -> Self {
        let outcomes = log.snapshot();
        let summary = summarize(&outcomes, total_recipients);

        Self {
            metadata: CampaignMetadata {
                start_time: started_at.to_rfc3339_opts(SecondsFormat::Secs, true),
                total_recipients,
                relays_available,
                success_rate: summary.success_rate(),
                successful: summary.success_count,
                failed: summary.failure_count,
                elapsed_secs: elapsed.as_secs_f64(),
            },
            outcomes,
            persisted: false,
        }
    }

    #[must_use]
    pub const fn successful(&self) -> usize {
        self.metadata.successful
    }

    #[must_use]
    pub const fn failed(&self) -> usize {
        self.metadata.failed
    }

    /// Writes the result as pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or the write fails.
    pub async fn persist(&self, path: &Path) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        tokio::fs::write(path, json).await
    }
}
