// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Spoolwatch: printer status event hub
//
// Entry point. Loads configuration, initialises logging, subscribes a stdout
// listener to the status monitor, and streams events as JSON lines until
// Ctrl-C.

mod services;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use spoolwatch_core::AppConfig;
use spoolwatch_core::error::{Result, SpoolwatchError};
use spoolwatch_monitor::ChannelListener;
use tracing::{error, info, warn};

use services::app_services::{AppServices, load_config};
use services::config_dir;

/// Stream printer status and job events as JSON lines.
#[derive(Debug, Parser)]
#[command(name = "spoolwatch", version, about)]
struct Cli {
    /// Configuration file [default: $XDG_CONFIG_HOME/spoolwatch/config.json]
    #[arg(short, long, env = "SPOOLWATCH_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,

    /// Printers to listen to, overriding the configured list. None means all.
    #[arg(value_name = "PRINTER")]
    printers: Vec<String>,

    /// Do not print the current status at startup
    #[arg(long)]
    no_snapshot: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    let path = cli
        .config
        .clone()
        .unwrap_or_else(config_dir::default_config_path);

    // Logging is configured from the file, so a bad file can only go to stderr.
    let mut config = match load_config(&path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("spoolwatch: {e}");
            return ExitCode::FAILURE;
        }
    };
    if !cli.printers.is_empty() {
        config.printers = cli.printers;
    }
    if cli.no_snapshot {
        config.snapshot_on_start = false;
    }

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&config.log_filter)),
        )
        .init();

    info!(config = %path.display(), "spoolwatch starting");

    match run(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "spoolwatch stopped with an error");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: AppConfig) -> Result<()> {
    let services = AppServices::init(config)?;

    let (listener, mut events) = ChannelListener::channel();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => warn!(error = %e, "could not encode status event"),
            }
        }
    });

    let connection = services.attach(listener)?;
    info!(
        connection = %connection.id(),
        printers = ?services.config().printers,
        "listening for printer events"
    );

    tokio::signal::ctrl_c().await?;
    info!("shutting down");

    services.monitor().unsubscribe(connection.id());
    let stopping = services.clone();
    tokio::task::spawn_blocking(move || stopping.shutdown())
        .await
        .map_err(|e| SpoolwatchError::Backend(format!("shutdown task failed: {e}")))?;

    // Last sender goes with the connection; the printer task then drains out.
    drop(connection);
    if printer.await.is_err() {
        warn!("event printer task panicked");
    }
    Ok(())
}
