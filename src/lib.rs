//! Bulk email dispatch across a pool of SMTP relays.
//!
//! A campaign takes a list of recipients, a list of relay credentials and a
//! message template, and delivers one message per recipient with:
//! - bounded parallelism (`max_workers` concurrent deliveries),
//! - a fresh, uniformly random relay for every attempt,
//! - linear backoff between retries,
//! - exactly one terminal outcome per recipient, collected in a [`ResultLog`].
//!
//! The engine is single-shot and in-memory. Nothing survives the process
//! except the JSON result file written at the end of the run.

pub mod audit;
pub mod client;
pub mod config;
mod delivery;
mod error;
pub mod loader;
pub mod logging;
mod policy;
mod relay;
mod result_log;
mod runner;
mod types;

pub use tracing;

pub use delivery::{Delivery, SmtpDelivery};
pub use error::{
    CampaignError, ConfigurationError, DeliveryError, ExhaustedRetriesError, LineError, LoadError,
};
pub use policy::retry::{RetryPolicy, RetryScheduler, RetryState};
pub use relay::{RelayCredential, RelayPool};
pub use result_log::{AttemptOutcome, CampaignMetadata, CampaignResult, CampaignSummary, ResultLog};
pub use runner::{CampaignRunner, RunConfig};
pub use types::{MessageTemplate, Recipient, SmtpTimeouts};
