mod api;
mod assemble;
mod config;
mod crawler;
mod fetch;
mod html;
mod jsonld;
mod models;
mod normalize;
mod pagination;
mod queue;
mod sink;
mod state;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use config::{OutputTarget, ScrapeArgs};
use crawler::{Crawler, RunStats};
use fetch::{HttpTransport, ProxyRotator};
use models::SalaryInput;
use sink::{JsonLinesSink, RecordSink};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "kununu-jobs")]
#[command(about = "Harvest job postings from kununu.com into JSON lines")]
struct Cli {
    /// Log filter used when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Search and crawl job postings
    Scrape(ScrapeArgs),

    /// Extract one saved detail page and print the record
    Extract {
        /// HTML file of a job detail page
        file: PathBuf,

        /// URL to put on the record (defaults to the file path)
        #[arg(short, long)]
        url: Option<String>,
    },

    /// Show how a salary string is normalized
    Salary {
        text: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let outcome = match cli.command {
        Commands::Scrape(args) => scrape(args).await,
        Commands::Extract { file, url } => extract(file, url),
        Commands::Salary { text } => {
            let input = match text.trim().parse::<f64>() {
                Ok(n) => SalaryInput::Numeric(n),
                Err(_) => SalaryInput::FreeText(text),
            };
            match normalize::normalize_salary(&input) {
                Some(salary) => println!("{}", salary),
                None => println!("(no salary)"),
            }
            Ok(())
        }
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        std::process::exit(1);
    }
    Ok(())
}

async fn scrape(args: ScrapeArgs) -> Result<()> {
    let config = config::load(&args)?;
    let started = Utc::now();

    let proxies = Arc::new(ProxyRotator::new(config.proxy_urls.clone()));
    let transport = Arc::new(HttpTransport::new(config.timeout, config.max_retries, &proxies)?);
    let sink = match &config.output {
        OutputTarget::Stdout => JsonLinesSink::stdout(),
        OutputTarget::File(path) => JsonLinesSink::open(path).await?,
    };
    let to_stdout = config.output == OutputTarget::Stdout;

    info!(
        "Starting: title={:?} location={:?} target={} max_pages={} details={} concurrency={} proxies={}",
        config.crawl.criteria.title,
        config.crawl.criteria.location,
        config.crawl.target.map_or("unlimited".to_string(), |n| n.to_string()),
        config.crawl.max_pages,
        config.crawl.collect_details,
        config.crawl.max_concurrency,
        config.proxy_urls.len()
    );
    info!("Writing records to {}", sink.target());
    let target = sink.target().to_string();

    let sink: Arc<dyn RecordSink> = Arc::new(sink);
    let crawler = Crawler::new(transport, sink, proxies, config.crawl);
    let stats = crawler.run().await?;

    let elapsed = Utc::now() - started;
    info!("Finished. Saved {} job listings from Kununu.", stats.saved);
    info!("Run took {}s", elapsed.num_seconds());

    if !to_stdout {
        print_summary(&stats, &target);
    }
    Ok(())
}

fn print_summary(stats: &RunStats, target: &str) {
    println!("Saved {} jobs to {}", stats.saved, target);
    println!("  API pages:        {}", stats.api_pages);
    println!("  Listing pages:    {}", stats.listing_pages);
    println!("  Details fetched:  {}", stats.details_fetched);
    println!("  Details failed:   {}", stats.details_failed);
    println!("  Duplicates:       {}", stats.duplicates_skipped);
    println!("  Past target:      {}", stats.skipped_after_target);
}

fn extract(file: PathBuf, url: Option<String>) -> Result<()> {
    let body = std::fs::read_to_string(&file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let url = url.unwrap_or_else(|| file.display().to_string());
    let record = crawler::extract_record(&url, &body, None);
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}
