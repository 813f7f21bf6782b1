use anyhow::Context;
use clap::Parser;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use tracing::warn;
use tracing_subscriber::EnvFilter;

mod compose;
mod config;
mod error;
mod generate;
mod labels;
mod noise;
mod scene;
mod utils;

/// Synthesize labeled object-detection training images from pairs of source images
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the JSON config; images, labels and data.yaml are written next to it
    config: PathBuf,

    /// Seed for all random parameters, overrides the config file
    #[arg(long)]
    seed: Option<u64>,

    /// Number of threads used to compose samples (defaults to number of CPU cores)
    #[arg(short, long, default_value_t = thread::available_parallelism().map_or(1, |p| p.get()))]
    threads: usize,

    /// Log every sample
    #[arg(short, long, default_value_t = false)]
    verbose: bool,

    /// Hide the progress bar
    #[arg(long, default_value_t = false)]
    no_progress: bool,
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, finishing samples already in progress");
                cancel.store(true, Ordering::Relaxed);
            }
        });
    }

    let options = generate::GenerateOptions {
        config_path: args.config.clone(),
        seed: args.seed,
        threads: args.threads,
        show_progress: !args.no_progress,
    };

    let stats = tokio::task::spawn_blocking(move || generate::generate_dataset(&options, &cancel))
        .await
        .context("dataset generation task panicked")?
        .with_context(|| format!("failed to generate dataset from {}", args.config.display()))?;

    generate::print_generation_stats(&stats);
    Ok(())
}
