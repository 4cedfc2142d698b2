//! Command-line entry point for relaycast
//!
//! Scaffolds missing input files, loads the configuration, relays,
//! recipients and template, runs the campaign and prints a summary.

use std::{path::PathBuf, sync::Arc};

use anyhow::Context;
use clap::Parser;
use relaycast::{
    CampaignRunner,
    audit::Auditor,
    config::{self, CampaignConfig},
    loader, logging,
};

const BANNER: &str = r"
           _                            _
  _ __ ___| | __ _ _   _  ___ __ _ ___| |_
 | '__/ _ \ |/ _` | | | |/ __/ _` / __| __|
 | | |  __/ | (_| | |_| | (_| (_| \__ \ |_
 |_|  \___|_|\__,_|\__, |\___\__,_|___/\__|
                   |___/
";

/// Bulk email dispatch across a pool of SMTP relays
#[derive(Parser, Debug)]
#[command(name = "relaycast")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Configuration file (falls back to $RELAYCAST_CONFIG, then ./relaycast.config.ron)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Create any missing input files with example content, then exit
    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    logging::init();

    println!("{BANNER}");
    println!("    relaycast v{}\n", env!("CARGO_PKG_VERSION"));

    let config_path = config::find_config_file(cli.config);

    // Scaffolding needs the file names, which come from the config when it exists.
    let config = if config_path.exists() {
        CampaignConfig::load(&config_path)?
    } else {
        CampaignConfig::default()
    };

    for created in loader::scaffold(&config_path, &config)? {
        println!("Created {} with example data", created.display());
    }

    if cli.init {
        return Ok(());
    }

    let run_config = config
        .run_config()
        .with_context(|| format!("Invalid configuration in {}", config_path.display()))?;

    let relays = loader::load_relays(&config.files.relays)?;
    let recipients = loader::load_recipients(&config.files.recipients)?;
    let template = loader::load_template(&config.files.template, config.email.subject.as_str())?;

    println!(
        "Starting email campaign to {} recipients using {} relays",
        recipients.len(),
        relays.len()
    );
    println!(
        "Max workers: {} | Retries: {} | Delay: {}s\n",
        config.settings.max_workers, config.settings.max_retries, config.settings.base_delay_secs
    );

    let total = recipients.len();
    let runner = CampaignRunner::new(Arc::new(config.smtp_delivery()), run_config)
        .auditor(Auditor::new(config.audit.clone()))
        .output(config.files.results.as_path());

    let result = runner
        .run(recipients, relays, template)
        .await
        .with_context(|| {
            format!(
                "Check {} and {}",
                config.files.relays.display(),
                config.files.recipients.display()
            )
        })?;

    println!(
        "\nCampaign completed in {:.2} seconds",
        result.metadata.elapsed_secs
    );
    println!("Successful: {}/{total}", result.successful());
    println!("Failed: {}", result.failed());
    if result.persisted {
        println!("Results saved to {}", config.files.results.display());
    } else {
        println!(
            "Results could not be saved to {}",
            config.files.results.display()
        );
    }

    Ok(())
}
