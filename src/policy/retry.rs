//! Retry policy and the per-recipient retry state machine.
//!
//! ```text
//! Attempting(a) --success--------------------------> Terminal(Ok)
//! Attempting(a) --failure, a < max_retries---------> Suspended(base * (a + 1))
//! Attempting(a) --failure, a == max_retries--------> Terminal(Err)
//! Suspended     --backoff elapsed------------------> Attempting(a + 1)
//! ```
//!
//! [`RetryPolicy::advance`] is the pure transition function; the
//! [`RetryScheduler`] drives it against a real (or fake) [`Delivery`].

use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::{
    audit::Auditor,
    delivery::Delivery,
    error::{ConfigurationError, DeliveryError, ExhaustedRetriesError},
    relay::RelayPool,
    result_log::AttemptOutcome,
    types::{MessageTemplate, Recipient},
};

/// Retry policy configuration for one recipient's delivery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `max_retries + 1` attempts in total.
    ///
    /// Default: 2
    pub max_retries: u32,

    /// Backoff unit. The pause after zero-indexed attempt `a` is
    /// `base_delay * (a + 1)` (linear, not exponential).
    ///
    /// Default: 1 second
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_secs(1),
        }
    }
}

/// Where a recipient's delivery currently stands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// About to make zero-indexed attempt `attempt` with a freshly picked relay.
    Attempting { attempt: u32 },

    /// Waiting out the backoff before `next_attempt`.
    Suspended {
        next_attempt: u32,
        backoff: Duration,
        last_error: DeliveryError,
    },

    /// Done: delivered, or every attempt failed.
    Terminal(Result<AttemptOutcome, ExhaustedRetriesError>),
}

impl RetryState {
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Terminal(_))
    }
}

impl RetryPolicy {
    #[must_use]
    pub const fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Builds a policy from a fractional number of seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_delay_secs` is negative, NaN or infinite.
    pub fn from_secs(max_retries: u32, base_delay_secs: f64) -> Result<Self, ConfigurationError> {
        let base_delay = Duration::try_from_secs_f64(base_delay_secs).map_err(|e| {
            ConfigurationError::InvalidSetting {
                field: "base_delay_secs",
                reason: format!("{base_delay_secs} is not a valid non-negative duration: {e}"),
            }
        })?;
        Ok(Self::new(max_retries, base_delay))
    }

    /// Total attempts a recipient may receive.
    #[must_use]
    pub const fn total_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Pause after the failed zero-indexed attempt `attempt`.
    #[must_use]
    pub const fn backoff_after(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt.saturating_add(1))
    }

    /// Check if another attempt follows a failure of zero-indexed `attempt`.
    #[must_use]
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_retries
    }

    /// Transition out of `Attempting { attempt }` given that attempt's result.
    #[must_use]
    pub fn advance(
        &self,
        attempt: u32,
        recipient: &Recipient,
        relay_username: &str,
        result: Result<(), DeliveryError>,
    ) -> RetryState {
        match result {
            Ok(()) => RetryState::Terminal(Ok(AttemptOutcome::success(
                recipient.clone(),
                relay_username,
                attempt + 1,
            ))),
            Err(last_error) if self.should_retry(attempt) => RetryState::Suspended {
                next_attempt: attempt + 1,
                backoff: self.backoff_after(attempt),
                last_error,
            },
            Err(last_error) => RetryState::Terminal(Err(ExhaustedRetriesError {
                recipient: recipient.clone(),
                attempts: attempt + 1,
                relay_username: relay_username.to_string(),
                last_error,
            })),
        }
    }
}

/// Drives the retry state machine for single recipients.
#[derive(Debug, Clone, Default)]
pub struct RetryScheduler {
    policy: RetryPolicy,
    auditor: Auditor,
}

impl RetryScheduler {
    #[must_use]
    pub const fn new(policy: RetryPolicy, auditor: Auditor) -> Self {
        Self { policy, auditor }
    }

    #[must_use]
    pub const fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Delivers to `recipient` until success or until the policy gives up.
    ///
    /// Each attempt draws a new relay from `pool`. The backoff sleep suspends
    /// only the calling task. Always returns exactly one terminal outcome; on
    /// failure it carries the final attempt's error.
    pub async fn deliver_with_retry(
        &self,
        recipient: &Recipient,
        pool: &RelayPool,
        delivery: &dyn Delivery,
        template: &MessageTemplate,
    ) -> AttemptOutcome {
        let started = Instant::now();
        let mut state = RetryState::Attempting { attempt: 0 };

        loop {
            state = match state {
                RetryState::Attempting { attempt } => {
                    let relay = pool.pick_relay();
                    self.auditor
                        .delivery_attempt(recipient.as_str(), &relay.username, attempt + 1);

                    let result = delivery.attempt(recipient, relay, template).await;
                    self.policy.advance(attempt, recipient, &relay.username, result)
                }
                RetryState::Suspended {
                    next_attempt,
                    backoff,
                    last_error,
                } => {
                    tracing::debug!(
                        recipient = %recipient,
                        attempt = next_attempt,
                        backoff_ms = backoff.as_millis(),
                        error = %last_error,
                        "Attempt failed, backing off before retry"
                    );
                    tokio::time::sleep(backoff).await;
                    RetryState::Attempting {
                        attempt: next_attempt,
                    }
                }
                RetryState::Terminal(Ok(outcome)) => {
                    tracing::info!(
                        "Sent to {} via {}",
                        outcome.recipient,
                        outcome.relay_username
                    );
                    self.auditor.delivery_success(
                        outcome.recipient.as_str(),
                        &outcome.relay_username,
                        outcome.attempt_number,
                        started.elapsed().as_millis(),
                    );
                    return outcome;
                }
                RetryState::Terminal(Err(exhausted)) => {
                    tracing::warn!(
                        "Failed to send to {}: {}",
                        exhausted.recipient,
                        exhausted.last_error
                    );
                    self.auditor.delivery_failure(
                        exhausted.recipient.as_str(),
                        &exhausted.last_error.to_string(),
                        exhausted.last_error.kind(),
                        exhausted.attempts,
                    );
                    return exhausted.into();
                }
            };
        }
    }
}
