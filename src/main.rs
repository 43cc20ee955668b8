mod artifact;
mod batcher;
mod config;
mod delivery;
mod error;
mod model;
mod notion;
mod parser;
mod retry;
mod scrape;
mod source;

use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use tracing::info;

use batcher::{BookBatch, RequestLimits};
use config::{Config, NotionConfig};
use delivery::{DeliveryConfig, DeliveryEngine, DeliveryReport, Pacing, GROUP_SIZE, PACING_MIN};
use notion::NotionClient;
use source::SourceClient;

#[derive(Parser)]
#[command(name = "bible_publisher", about = "Scrape Bible versions and publish them to a Notion database")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Scrape versions into JSON artifacts (one failing version does not stop the others)
    Scrape {
        /// Version abbreviations, e.g. KJV NIV
        #[arg(required = true)]
        versions: Vec<String>,
    },
    /// Publish a scraped version to the Notion database
    Publish {
        version: String,
        /// Pace groups with a fixed 1100ms instead of 1100-1300ms jitter
        #[arg(long)]
        fixed_pacing: bool,
    },
    /// Scrape + publish one version
    Run {
        version: String,
        #[arg(long)]
        fixed_pacing: bool,
    },
    /// Show the pages a publish would create, per book
    Plan {
        version: String,
        /// Max rows to display
        #[arg(short = 'n', long, default_value = "66")]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let config = Config::from_env();

    let result = match cli.command {
        Commands::Scrape { versions } => scrape_versions(&config, &versions).await,
        Commands::Publish {
            version,
            fixed_pacing,
        } => publish(&config, &version, fixed_pacing).await,
        Commands::Run {
            version,
            fixed_pacing,
        } => {
            scrape_versions(&config, std::slice::from_ref(&version)).await?;
            publish(&config, &version, fixed_pacing).await
        }
        Commands::Plan { version, limit } => plan(&config, &version, limit),
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn scrape_versions(config: &Config, versions: &[String]) -> anyhow::Result<()> {
    let client = SourceClient::new()?;
    scrape::scrape_versions(&client, config, versions).await
}

fn load_batches(config: &Config, version: &str) -> anyhow::Result<Vec<BookBatch>> {
    let path = artifact::artifact_path(&config.data_dir, version);
    let bible = artifact::load(&path)?;
    let batches = batcher::batch_version(&bible, RequestLimits::default())
        .with_context(|| format!("Cannot batch {}", version))?;
    Ok(batches)
}

async fn publish(config: &Config, version: &str, fixed_pacing: bool) -> anyhow::Result<()> {
    let notion = NotionClient::new(NotionConfig::from_env()?)?;
    let batches = load_batches(config, version)?;

    let mut delivery = DeliveryConfig::default();
    if fixed_pacing {
        delivery.pacing = Pacing::Fixed(PACING_MIN);
    }
    let engine = DeliveryEngine::new(notion, delivery);

    let total: usize = batches.iter().map(|b| b.requests.len()).sum();
    println!(
        "Publishing {} ({} books, {} pages)...",
        version,
        batches.len(),
        total
    );

    let pb = ProgressBar::new(total as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] {bar:40} {pos}/{len} {msg} (eta {eta})")?
            .progress_chars("=> "),
    );

    let mut report = DeliveryReport::default();
    for book in &batches {
        pb.set_message(book.name.clone());
        info!(
            "Publishing {} ({}/{}): {} pages",
            book.name,
            book.book_index,
            batches.len(),
            book.requests.len()
        );
        let book_report = engine
            .deliver(&book.requests)
            .await
            .with_context(|| format!("Publishing {} aborted at {}", version, book.name))?;
        report.absorb(book_report);
        pb.inc(book.requests.len() as u64);
    }

    pb.finish_and_clear();
    println!(
        "Done: {} pages in {} groups ({} retries).",
        report.requests, report.groups, report.retries
    );
    Ok(())
}

fn plan(config: &Config, version: &str, limit: usize) -> anyhow::Result<()> {
    let batches = load_batches(config, version)?;

    println!(
        "{:>3} | {:<20} | {:<2} | {:>5} | {:>6} | {:>6} | {:<6}",
        "#", "Book", "T", "Pages", "Blocks", "Spans", "Color"
    );
    println!("{}", "-".repeat(66));

    for book in batches.iter().take(limit) {
        let blocks: usize = book.requests.iter().map(|r| r.blocks.len()).sum();
        let spans: usize = book
            .requests
            .iter()
            .flat_map(|r| &r.blocks)
            .map(|b| b.spans.len())
            .sum();
        let (tag, color) = book
            .requests
            .first()
            .map(|r| (r.testament.tag(), r.color))
            .unwrap_or(("-", "-"));
        println!(
            "{:>3} | {:<20} | {:<2} | {:>5} | {:>6} | {:>6} | {:<6}",
            book.book_index,
            truncate(&book.name, 20),
            tag,
            book.requests.len(),
            blocks,
            spans,
            color
        );
    }

    let pages: usize = batches.iter().map(|b| b.requests.len()).sum();
    let groups = pages.div_ceil(GROUP_SIZE);
    let min_pacing = PACING_MIN * groups.saturating_sub(1) as u32;
    println!(
        "\n{} books | {} pages | {} groups | at least {} of pacing",
        batches.len(),
        pages,
        groups,
        format_duration(min_pacing)
    );
    Ok(())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max).collect();
        format!("{}...", truncated)
    }
}

fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs < 60 {
        format!("{:.1}s", d.as_secs_f64())
    } else if secs < 3600 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    }
}
