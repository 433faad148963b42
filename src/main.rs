//! Product Scanner - find a product by pointing a camera at its model code
//!
//! Samples the center of the camera view, reads model codes like `ABCDE-12`,
//! and looks them up in the catalog search service. Typed queries go straight
//! to the search service.

mod app;
mod capture;
mod config;
mod console;
mod scanner;
mod search;
mod shared;
mod vision;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::runtime::Runtime;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::app::ProductScannerApp;
use crate::config::AppConfig;

/// Product Scanner - model code lookup
#[derive(Parser, Debug)]
#[command(name = "product-scanner")]
#[command(about = "Scan a printed model code or type a query to find matching products")]
struct Args {
    /// Configuration file (defaults to the user config directory)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Search service endpoint, overrides the config file
    #[arg(long)]
    api_url: Option<String>,

    /// Still images to replay as the camera feed
    #[arg(long, num_args = 1..)]
    frames: Vec<PathBuf>,

    /// Run a single search for this text and exit
    #[arg(short, long)]
    query: Option<String>,

    /// Write the effective configuration to the config file and exit
    #[arg(long)]
    write_config: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::default_config_path()?,
    };
    let mut config = load_or_create_config(&config_path);
    if let Some(url) = &args.api_url {
        config.search.api_url = url.clone();
    }

    if args.write_config {
        config::save_config(&config, &config_path)
            .with_context(|| format!("Failed to write {:?}", config_path))?;
        println!("Wrote {}", config_path.display());
        return Ok(());
    }

    let rt = Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(run(args, config))
}

/// Load configuration from file or fall back to defaults
fn load_or_create_config(path: &std::path::Path) -> AppConfig {
    if path.exists() {
        match config::load_config(path) {
            Ok(config) => {
                info!("Loaded configuration from {:?}", path);
                return config;
            }
            Err(e) => warn!("Ignoring unreadable configuration {:?}: {:#}", path, e),
        }
    }
    info!("Using default configuration");
    AppConfig::default()
}

async fn run(args: Args, config: AppConfig) -> Result<()> {
    if matches!(&args.query, Some(q) if q.trim().is_empty()) {
        anyhow::bail!("--query must not be empty");
    }

    let (events_tx, events_rx) = crossbeam_channel::unbounded();
    let once = args.query.is_some();
    let console = tokio::task::spawn_blocking(move || console::run_console(events_rx, once));

    // One-shot mode never touches the camera
    let frames = if once { Vec::new() } else { args.frames };
    let app = match ProductScannerApp::launch(&config, frames, Arc::new(events_tx)).await {
        Ok(app) => app,
        Err(e) => {
            // The console already printed the error; let it drain
            let _ = console.await;
            return Err(e.into());
        }
    };

    if let Some(query) = args.query {
        app.pipeline().manual_search(query);
        console.await.context("Console task failed")?;
        app.shutdown().await;
        return Ok(());
    }

    info!("Type a product name or code and press Enter (:start, :stop, :quit)");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => match line? {
                None => break,
                Some(line) => match line.trim() {
                    ":quit" | ":q" => break,
                    ":start" => app.pipeline().start_scanning(),
                    ":stop" => app.pipeline().stop_scanning(),
                    text => app.pipeline().manual_search(text),
                },
            },
        }
    }

    app.shutdown().await;
    info!("Product Scanner shutdown complete");
    Ok(())
}
