mod checkpoint;
mod client;
mod config;
mod crawler;
mod error;
mod key;
mod merge;
mod normalize;
mod parser;
mod record;
mod sink;

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};

use crate::checkpoint::{Checkpoint, CheckpointState};
use crate::client::{HttpPageClient, PageClient, RenderedPageClient};
use crate::config::{ClientKind, Settings};
use crate::crawler::CrawlEngine;
use crate::merge::MergeProcessor;
use crate::sink::RecordSink;

#[derive(Parser)]
#[command(name = "eapps_scraper", about = "Planning application case scraper")]
struct Cli {
    /// Config file (default: ./eapps.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Walk the case space from the last checkpoint, appending to raw.csv
    Crawl,
    /// Normalize raw.csv and merge it into processed.csv
    Merge,
    /// Show checkpoint position and dataset sizes
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let t0 = Instant::now();
    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("loading configuration")?;
    fs::create_dir_all(&settings.output_dir)
        .with_context(|| format!("creating {:?}", settings.output_dir))?;

    let result = match cli.command {
        Commands::Crawl => match settings.client.kind {
            ClientKind::Direct => crawl(HttpPageClient::new(&settings.client)?, &settings).await,
            ClientKind::Rendered => {
                crawl(RenderedPageClient::new(&settings.client)?, &settings).await
            }
        },
        Commands::Merge => {
            let processor = MergeProcessor::new(settings.key_space()?, &settings.name_exemptions);
            let s = processor.run(&settings.processed_path(), &settings.raw_path())?;
            println!(
                "Merged {} incoming into {} accumulated rows ({} dropped) -> {} rows in {:?}",
                s.incoming,
                s.accumulated,
                s.dropped,
                s.output,
                settings.processed_path()
            );
            Ok(())
        }
        Commands::Status => {
            let checkpoint = Checkpoint::new(settings.checkpoint_path());
            match checkpoint.load() {
                CheckpointState::Start => println!("Checkpoint: none ({:?})", checkpoint.path()),
                CheckpointState::At(key) => println!("Checkpoint: {} ({:?})", key, checkpoint.path()),
            }
            let raw = sink::read_all(&settings.raw_path())?;
            let processed = merge::read_accumulated(&settings.processed_path())?;
            println!("Raw:       {}", raw.len());
            println!("Processed: {}", processed.len());
            if let Ok(date) = fs::read_to_string(settings.extraction_date_path()) {
                println!("Extracted: {}", date.trim());
            }
            Ok(())
        }
    };

    let elapsed = t0.elapsed();
    if elapsed.as_secs() >= 1 {
        println!("\nDone in {}", format_duration(elapsed));
    }

    result
}

async fn crawl<C: PageClient>(client: C, settings: &Settings) -> anyhow::Result<()> {
    let sink = RecordSink::open(settings.raw_path())?;
    let checkpoint = Checkpoint::new(settings.checkpoint_path());

    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {pos} keys, at {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));

    let mut engine = CrawlEngine::new(
        client,
        settings.key_space()?,
        settings.failure_threshold,
        checkpoint,
        sink,
    )
    .with_progress(pb);
    let summary = engine.run().await?;

    let t = summary.tally;
    println!(
        "Walked {} ranges: {} recorded, {} not found, {} not yet submitted, {} unrecognized.",
        summary.ranges, t.records, t.not_found, t.not_yet_submitted, t.unrecognized
    );
    if let Some(key) = summary.last_key {
        println!("Last key probed: {}", key);
    }

    let date = crawler::write_extraction_date(&settings.extraction_date_path())?;
    println!("Extraction date {} written to {:?}", date, settings.extraction_date_path());
    Ok(())
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
