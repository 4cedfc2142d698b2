//! Campaign orchestration
//!
//! The runner validates its inputs, then spreads recipients over a bounded
//! pool of tokio tasks. Each task runs the retry scheduler for one recipient
//! and records the terminal outcome; the pool refills as tasks finish, so no
//! more than `max_workers` deliveries are ever in flight.

use std::{
    any::Any,
    panic::AssertUnwindSafe,
    path::PathBuf,
    sync::Arc,
    time::Instant,
};

use chrono::Utc;
use futures_util::FutureExt;
use tokio::task::JoinSet;
use tracing::{error, info};

use crate::{
    audit::Auditor,
    delivery::Delivery,
    error::{CampaignError, ConfigurationError},
    internal,
    policy::retry::{RetryPolicy, RetryScheduler},
    relay::{RelayCredential, RelayPool},
    result_log::{AttemptOutcome, CampaignResult, ResultLog},
    types::{MessageTemplate, Recipient},
};

/// Run-wide knobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunConfig {
    /// Upper bound on concurrent deliveries.
    ///
    /// Default: 10
    pub max_workers: usize,
    pub retry: RetryPolicy,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_workers: 10,
            retry: RetryPolicy::default(),
        }
    }
}

impl RunConfig {
    /// # Errors
    ///
    /// Returns an error if `max_workers` is zero.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        if self.max_workers == 0 {
            return Err(ConfigurationError::InvalidSetting {
                field: "max_workers",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// State shared by every worker of one run.
struct Campaign {
    scheduler: RetryScheduler,
    pool: RelayPool,
    delivery: Arc<dyn Delivery>,
    template: MessageTemplate,
    log: Arc<ResultLog>,
}

impl Campaign {
    async fn deliver(&self, recipient: Recipient) {
        let delivering = self.scheduler.deliver_with_retry(
            &recipient,
            &self.pool,
            self.delivery.as_ref(),
            &self.template,
        );

        let delivered = AssertUnwindSafe(delivering).catch_unwind().await;
        let outcome = match delivered {
            Ok(outcome) => outcome,
            Err(panic) => {
                let reason = panic_reason(panic.as_ref());
                error!("Worker for {recipient} panicked: {reason}");
                AttemptOutcome::failure(recipient, "", 0, format!("Worker panicked: {reason}"))
            }
        };

        self.log.record(outcome);
    }
}

fn panic_reason(panic: &(dyn Any + Send)) -> String {
    panic
        .downcast_ref::<&str>()
        .map(ToString::to_string)
        .or_else(|| panic.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic payload".to_string())
}

fn spawn_worker(workers: &mut JoinSet<()>, campaign: &Arc<Campaign>, recipient: Recipient) {
    let campaign = Arc::clone(campaign);
    workers.spawn(async move {
        campaign.deliver(recipient).await;
    });
}

/// Runs campaigns through a [`Delivery`] implementation.
pub struct CampaignRunner {
    delivery: Arc<dyn Delivery>,
    config: RunConfig,
    auditor: Auditor,
    output: Option<PathBuf>,
}

impl CampaignRunner {
    #[must_use]
    pub fn new(delivery: Arc<dyn Delivery>, config: RunConfig) -> Self {
        Self {
            delivery,
            config,
            auditor: Auditor::default(),
            output: None,
        }
    }

    #[must_use]
    pub fn auditor(mut self, auditor: Auditor) -> Self {
        self.auditor = auditor;
        self
    }

    /// Where to write the JSON result once the run completes.
    #[must_use]
    pub fn output(mut self, path: impl Into<PathBuf>) -> Self {
        self.output = Some(path.into());
        self
    }

    #[must_use]
    pub const fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Delivers `template` to every recipient.
    ///
    /// Returns once every recipient has exactly one terminal outcome. A
    /// failure to write the result file is logged; the result is still
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`CampaignError::Configuration`] before any send if there are
    /// no relays, no recipients, or the run configuration is invalid.
    pub async fn run(
        &self,
        recipients: Vec<Recipient>,
        relays: Vec<RelayCredential>,
        template: MessageTemplate,
    ) -> Result<CampaignResult, CampaignError> {
        self.config.validate()?;
        let pool = RelayPool::new(relays)?;
        if recipients.is_empty() {
            return Err(ConfigurationError::NoRecipients.into());
        }

        let total_recipients = recipients.len();
        let relays_available = pool.len();
        let max_workers = self.config.max_workers.min(total_recipients);

        let started_at = Utc::now();
        let started = Instant::now();

        internal!(
            level = INFO,
            "Starting campaign: {} recipients, {} relays, {} workers",
            total_recipients,
            relays_available,
            max_workers
        );
        self.auditor
            .campaign_started(total_recipients, relays_available, max_workers);

        let log = Arc::new(ResultLog::new());
        let campaign = Arc::new(Campaign {
            scheduler: RetryScheduler::new(self.config.retry, self.auditor.clone()),
            pool,
            delivery: Arc::clone(&self.delivery),
            template,
            log: Arc::clone(&log),
        });

        let mut workers = JoinSet::new();
        let mut pending = recipients.into_iter();

        for recipient in pending.by_ref().take(max_workers) {
            spawn_worker(&mut workers, &campaign, recipient);
        }

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                // Panics are caught inside the task, so this is a cancelled runtime.
                error!("Worker task failed: {e}");
            }
            if let Some(recipient) = pending.next() {
                spawn_worker(&mut workers, &campaign, recipient);
            }
        }

        let mut result = CampaignResult::from_log(
            &log,
            total_recipients,
            relays_available,
            started_at,
            started.elapsed(),
        );

        info!(
            successful = result.successful(),
            failed = result.failed(),
            success_rate = %result.metadata.success_rate,
            "Campaign completed in {:.2} seconds",
            result.metadata.elapsed_secs
        );
        self.auditor.campaign_finished(
            result.successful(),
            result.failed(),
            result.metadata.elapsed_secs,
        );

        if let Some(path) = &self.output {
            match result.persist(path).await {
                Ok(()) => {
                    result.persisted = true;
                    info!("Results saved to {}", path.display());
                }
                Err(e) => error!("Failed to save results to {}: {e}", path.display()),
            }
        }

        Ok(result)
    }
}
