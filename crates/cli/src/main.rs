//! polarsync
//!
//! Lists, downloads and mirrors the files stored on a Polar wrist device
//! connected over USB.

mod cli;
mod config;

use clap::Parser;
use cli::{Cli, Command};
use color_eyre::eyre::{Result, WrapErr, bail};
use config::Config;
use polarsync_device::{
    CancelFlag, Device, Pftp, default_sync_root, download_file, list_directory, sync_all,
};
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    let config = Config::load(cli.config.as_ref())?
        .with_log_level(cli.log_level.clone())
        .with_backend(cli.backend)
        .with_serial_device(cli.serial_device.clone());

    init_logging(&config.log_level)?;

    let cancel = CancelFlag::new();
    spawn_interrupt_handler(cancel.clone());

    let options = config.device.connect_options(cancel);
    let device = Device::connect(&options).wrap_err("Failed to connect to the device")?;

    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        backend = %device.backend(),
        product = device.identity().product.as_deref().unwrap_or("unknown"),
        serial = device.serial_number().unwrap_or("unknown"),
        "Device ready"
    );

    let mut pftp = Pftp::new(device);

    match cli.command {
        Command::Ls { path } => cmd_ls(&mut pftp, &path).await,
        Command::Get { remote, local } => cmd_get(&mut pftp, &remote, local).await,
        Command::Sync { dir } => cmd_sync(&mut pftp, dir.or(config.sync.root)).await,
    }
}

fn init_logging(level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(true))
        .with(filter)
        .init();

    Ok(())
}

/// Cancel the running request on Ctrl-C.
fn spawn_interrupt_handler(cancel: CancelFlag) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                tracing::warn!("Interrupted, cancelling");
                cancel.cancel();
            }
            Err(err) => tracing::error!(error = %err, "Failed to listen for Ctrl-C"),
        }
    });
}

async fn cmd_ls(pftp: &mut Pftp<Device>, path: &str) -> Result<()> {
    let entries = list_directory(pftp, path)
        .await
        .wrap_err_with(|| format!("Failed to list {path}"))?;

    for entry in entries {
        if entry.is_dir() {
            println!("{:>10}  {}", "-", entry.name);
        } else {
            println!("{:>10}  {}", entry.size, entry.name);
        }
    }
    Ok(())
}

async fn cmd_get(pftp: &mut Pftp<Device>, remote: &str, local: Option<PathBuf>) -> Result<()> {
    let written = download_file(pftp, remote, local.as_deref())
        .await
        .wrap_err_with(|| format!("Failed to download {remote}"))?;

    println!("{remote} -> {}", written.display());
    Ok(())
}

async fn cmd_sync(pftp: &mut Pftp<Device>, root: Option<PathBuf>) -> Result<()> {
    let root = root.unwrap_or_else(|| default_sync_root(pftp.transport().serial_number()));

    let report = sync_all(pftp, &root)
        .await
        .wrap_err_with(|| format!("Sync to {} aborted", root.display()))?;

    println!(
        "{} directories, {} downloaded, {} up to date, {} failed",
        report.directories, report.downloaded, report.up_to_date, report.failed
    );

    if report.failed > 0 {
        bail!("{} files failed to download", report.failed);
    }
    Ok(())
}
