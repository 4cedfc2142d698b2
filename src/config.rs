//! Campaign configuration file (RON)
//!
//! ```ron
//! (
//!     settings: (max_workers: 10, max_retries: 2, base_delay_secs: 1.0),
//!     email: (subject: "Important Message"),
//!     files: (
//!         relays: "smtp.txt",
//!         recipients: "emails.txt",
//!         template: "email_template.html",
//!         results: "campaign_results.json",
//!     ),
//!     smtp: (
//!         helo_name: "localhost",
//!         require_tls: true,
//!         accept_invalid_certs: false,
//!         timeouts: (connect_secs: 30, command_secs: 30, data_secs: 120, quit_secs: 10),
//!     ),
//!     audit: (enabled: true, redact_recipients: false),
//! )
//! ```
//!
//! Every field is optional. Relative file paths resolve against the working
//! directory.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{
    audit::AuditConfig,
    delivery::SmtpDelivery,
    error::{ConfigurationError, LoadError},
    policy::retry::RetryPolicy,
    runner::RunConfig,
    types::SmtpTimeouts,
};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "RELAYCAST_CONFIG";

/// Configuration file used when neither the CLI nor the environment name one.
pub const DEFAULT_CONFIG_PATH: &str = "./relaycast.config.ron";

/// Picks the configuration path: CLI flag, then [`CONFIG_ENV`], then
/// [`DEFAULT_CONFIG_PATH`].
#[must_use]
pub fn resolve_path(cli: Option<PathBuf>, env: Option<String>) -> PathBuf {
    cli.or_else(|| env.filter(|value| !value.is_empty()).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// [`resolve_path`] against the real environment.
#[must_use]
pub fn find_config_file(cli: Option<PathBuf>) -> PathBuf {
    resolve_path(cli, std::env::var(CONFIG_ENV).ok())
}

/// Worker pool and retry settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    /// Default: 10
    #[serde(default = "default_max_workers")]
    pub max_workers: usize,

    /// Default: 2
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Default: 1.0
    #[serde(default = "default_base_delay_secs")]
    pub base_delay_secs: f64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            max_workers: default_max_workers(),
            max_retries: default_max_retries(),
            base_delay_secs: default_base_delay_secs(),
        }
    }
}

const fn default_max_workers() -> usize {
    10
}

const fn default_max_retries() -> u32 {
    2
}

const fn default_base_delay_secs() -> f64 {
    1.0
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSettings {
    /// Default: "Important Message"
    #[serde(default = "default_subject")]
    pub subject: String,
}

impl Default for EmailSettings {
    fn default() -> Self {
        Self {
            subject: default_subject(),
        }
    }
}

fn default_subject() -> String {
    "Important Message".to_string()
}

/// Input and output files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileSettings {
    /// `server|port|username|password` per line
    #[serde(default = "default_relays_path")]
    pub relays: PathBuf,

    /// One address per line
    #[serde(default = "default_recipients_path")]
    pub recipients: PathBuf,

    /// HTML body
    #[serde(default = "default_template_path")]
    pub template: PathBuf,

    /// JSON campaign result
    #[serde(default = "default_results_path")]
    pub results: PathBuf,
}

impl Default for FileSettings {
    fn default() -> Self {
        Self {
            relays: default_relays_path(),
            recipients: default_recipients_path(),
            template: default_template_path(),
            results: default_results_path(),
        }
    }
}

fn default_relays_path() -> PathBuf {
    PathBuf::from("smtp.txt")
}

fn default_recipients_path() -> PathBuf {
    PathBuf::from("emails.txt")
}

fn default_template_path() -> PathBuf {
    PathBuf::from("email_template.html")
}

fn default_results_path() -> PathBuf {
    PathBuf::from("campaign_results.json")
}

/// SMTP session settings applied to every relay.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Default: "localhost"
    #[serde(default = "default_helo_name")]
    pub helo_name: String,

    /// Fail the attempt when STARTTLS is unavailable. Default: true
    #[serde(default = "default_require_tls")]
    pub require_tls: bool,

    /// Default: false
    #[serde(default)]
    pub accept_invalid_certs: bool,

    #[serde(default)]
    pub timeouts: SmtpTimeouts,
}

impl Default for SmtpSettings {
    fn default() -> Self {
        Self {
            helo_name: default_helo_name(),
            require_tls: default_require_tls(),
            accept_invalid_certs: false,
            timeouts: SmtpTimeouts::default(),
        }
    }
}

fn default_helo_name() -> String {
    "localhost".to_string()
}

const fn default_require_tls() -> bool {
    true
}

/// The whole configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    #[serde(default)]
    pub settings: Settings,

    #[serde(default)]
    pub email: EmailSettings,

    #[serde(default)]
    pub files: FileSettings,

    #[serde(default)]
    pub smtp: SmtpSettings,

    #[serde(default)]
    pub audit: AuditConfig,
}

impl CampaignConfig {
    /// Parses a configuration from RON text.
    ///
    /// # Errors
    ///
    /// Returns an error if `content` is not valid RON for this schema.
    pub fn from_ron(content: &str) -> Result<Self, ron::error::SpannedError> {
        ron::from_str(content)
    }

    /// Reads and parses the configuration file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Read {
            path: path.to_path_buf(),
            source,
        })?;

        Self::from_ron(&content).map_err(|e| LoadError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Pretty-printed RON, as written by scaffolding.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation fails.
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::new())
    }

    /// # Errors
    ///
    /// Returns an error if `max_workers` is zero or `base_delay_secs` is not
    /// a finite, non-negative number.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.run_config().map(|_| ())
    }

    /// The validated run configuration.
    ///
    /// # Errors
    ///
    /// See [`CampaignConfig::validate`].
    pub fn run_config(&self) -> Result<RunConfig, ConfigurationError> {
        let config = RunConfig {
            max_workers: self.settings.max_workers,
            retry: RetryPolicy::from_secs(self.settings.max_retries, self.settings.base_delay_secs)?,
        };
        config.validate()?;
        self.smtp.timeouts.validate()?;
        Ok(config)
    }

    /// An [`SmtpDelivery`] using the `smtp` section.
    #[must_use]
    pub fn smtp_delivery(&self) -> SmtpDelivery {
        SmtpDelivery::new()
            .timeouts(self.smtp.timeouts.clone())
            .helo_name(self.smtp.helo_name.as_str())
            .require_tls(self.smtp.require_tls)
            .accept_invalid_certs(self.smtp.accept_invalid_certs)
    }
}
