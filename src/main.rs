use std::fs::File;
use std::io::BufWriter;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use listing_harvest::export::{write_records, OutputFormat};
use listing_harvest::scrapers::{HarvestConfig, Harvester, NonSuccessPolicy, RightmoveFetcher, SortType};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

/// Harvest property listings from paginated search results into a table
#[derive(Debug, Parser)]
#[command(name = "listing-harvest", version)]
struct Cli {
    /// JSON file with a harvest configuration; flags below override it
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(short, long, value_name = "FILE", default_value = "properties.csv")]
    output: PathBuf,

    #[arg(long, value_enum, default_value_t = OutputFormat::Csv)]
    format: OutputFormat,

    #[arg(long, value_name = "N")]
    max_pages: Option<usize>,

    #[arg(long, value_name = "N")]
    page_size: Option<usize>,

    #[arg(long, value_name = "MS")]
    delay_ms: Option<u64>,

    #[arg(long, value_name = "GBP")]
    min_price: Option<u64>,

    #[arg(long, value_name = "GBP")]
    max_price: Option<u64>,

    #[arg(long, value_name = "ID")]
    region: Option<String>,

    #[arg(long, value_name = "MILES")]
    radius: Option<f64>,

    #[arg(long, value_enum)]
    sort: Option<SortType>,

    #[arg(long, value_name = "URL")]
    base_url: Option<String>,

    #[arg(long, value_name = "URL")]
    origin: Option<String>,

    #[arg(long, value_name = "UA", env = "HARVEST_USER_AGENT")]
    user_agent: Option<String>,

    #[arg(long, value_name = "SECS")]
    timeout_secs: Option<u64>,

    #[arg(long, value_name = "N")]
    max_failures: Option<u32>,

    #[arg(long, value_enum)]
    on_non_success: Option<NonSuccessPolicy>,
}

impl Cli {
    fn harvest_config(&self) -> Result<HarvestConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let raw = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read config {}", path.display()))?;
                serde_json::from_str(&raw)
                    .with_context(|| format!("Failed to parse config {}", path.display()))?
            }
            None => HarvestConfig::default(),
        };

        if let Some(v) = self.max_pages {
            config.max_pages = v;
        }
        if let Some(v) = self.page_size {
            config.page_size = v;
        }
        if let Some(v) = self.delay_ms {
            config.politeness_delay_ms = v;
        }
        if let Some(v) = self.min_price {
            config.min_price = v;
        }
        if let Some(v) = self.max_price {
            config.max_price = v;
        }
        if let Some(v) = &self.region {
            config.region_identifier = v.clone();
        }
        if let Some(v) = self.radius {
            config.radius = v;
        }
        if let Some(v) = self.sort {
            config.sort_type = v;
        }
        if let Some(v) = &self.base_url {
            config.base_url = v.clone();
        }
        if let Some(v) = &self.origin {
            config.origin = v.clone();
        }
        if let Some(v) = &self.user_agent {
            config.user_agent = v.clone();
        }
        if let Some(v) = self.timeout_secs {
            config.request_timeout_secs = v;
        }
        if let Some(v) = self.max_failures {
            config.max_consecutive_failures = v;
        }
        if let Some(v) = self.on_non_success {
            config.non_success_policy = v;
        }

        config.validate().context("Invalid harvest configuration")?;
        Ok(config)
    }
}

#[derive(Debug, PartialEq)]
enum Interrupt {
    StopAfterPage,
    ExitNow,
}

/// First interrupt cancels the harvest, any later one asks for a hard exit.
fn on_interrupt(cancel: &CancellationToken) -> Interrupt {
    if cancel.is_cancelled() {
        Interrupt::ExitNow
    } else {
        cancel.cancel();
        Interrupt::StopAfterPage
    }
}

async fn handle_interrupts(cancel: CancellationToken) {
    while tokio::signal::ctrl_c().await.is_ok() {
        match on_interrupt(&cancel) {
            Interrupt::StopAfterPage => {
                warn!("Interrupted, finishing after the current page (Ctrl-C again to quit)");
            }
            Interrupt::ExitNow => {
                warn!("Interrupted again, exiting without saving");
                std::process::exit(130);
            }
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let config = cli.harvest_config()?;

    info!("🏠 Listing Harvest");
    info!(
        "Searching {} between £{} and £{} within {} miles",
        config.region_identifier, config.min_price, config.max_price, config.radius
    );
    if config.non_success_policy == NonSuccessPolicy::StopHarvest {
        info!("Any non-200 page ends the harvest; a passing server error will cut it short");
    }

    let fetcher = RightmoveFetcher::new(config.clone())?;
    let harvester = Harvester::new(&config, fetcher)?;

    // First Ctrl-C stops after the current page and still writes what we
    // have; a second one exits straight away.
    let cancel = CancellationToken::new();
    tokio::spawn(handle_interrupts(cancel.clone()));

    let report = harvester.run(&cancel).await;

    info!(
        "✅ Found {} properties on {} page(s), {} skipped ({:?})",
        report.records.len(),
        report.pages_fetched,
        report.pages_skipped,
        report.stop_reason
    );
    info!(
        "Took {}s",
        (report.finished_at - report.started_at).num_seconds()
    );

    if report.records.is_empty() {
        warn!("No properties were found");
    }

    let file = File::create(&cli.output)
        .with_context(|| format!("Failed to create {}", cli.output.display()))?;
    write_records(&report.records, cli.format, BufWriter::new(file))?;
    info!("💾 Saved {} properties to {}", report.records.len(), cli.output.display());

    Ok(())
}
