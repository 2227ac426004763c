//! Command-line interface for polarsync.

use clap::{Parser, Subcommand};
use polarsync_device::Backend;
use std::path::PathBuf;

/// polarsync - download data from Polar wrist devices over USB
#[derive(Debug, Parser)]
#[command(name = "polarsync")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true, env = "POLARSYNC_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, env = "POLARSYNC_LOG_LEVEL")]
    pub log_level: Option<String>,

    /// USB backend (auto, hid, acm)
    #[arg(short, long, global = true, value_parser = parse_backend)]
    pub backend: Option<Backend>,

    /// Serial device of the ACM backend
    #[arg(short, long, global = true)]
    pub serial_device: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// List a directory on the device
    Ls {
        /// Remote directory
        #[arg(default_value = "/")]
        path: String,
    },

    /// Download a single file
    Get {
        /// Remote file path
        remote: String,

        /// Local destination (default: remote base name)
        local: Option<PathBuf>,
    },

    /// Mirror the whole device into a local directory
    Sync {
        /// Local root (default: ~/Polar/<serial number>)
        dir: Option<PathBuf>,
    },
}

fn parse_backend(value: &str) -> Result<Backend, String> {
    match value.to_ascii_lowercase().as_str() {
        "auto" => Ok(Backend::Auto),
        "hid" => Ok(Backend::Hid),
        "acm" => Ok(Backend::Acm),
        other => Err(format!("unknown backend '{other}' (expected auto, hid or acm)")),
    }
}
