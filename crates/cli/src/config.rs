//! Configuration management for polarsync.
//!
//! Uses figment to merge configuration from multiple sources:
//! 1. Default values
//! 2. Config file (TOML)
//! 3. Environment variables (`POLARSYNC_`, nested keys split on `__`)
//! 4. Command-line arguments

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use polarsync_device::{Backend, CancelFlag, ConnectOptions, LinkOptions};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Device connection
    #[serde(default)]
    pub device: DeviceConfig,

    /// Sync behaviour
    #[serde(default)]
    pub sync: SyncConfig,
}

/// Device connection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Backend (auto, hid, acm)
    #[serde(default)]
    pub backend: Backend,

    /// Serial device of the ACM backend
    #[serde(default)]
    pub serial_device: Option<PathBuf>,

    /// Cumulative deadline of one request, in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Bound on a single physical read, in milliseconds
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
}

/// Sync settings
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Local root; `~/Polar/<serial number>` when unset
    #[serde(default)]
    pub root: Option<PathBuf>,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_request_timeout_secs() -> u64 {
    polarsync_device::DEFAULT_REQUEST_TIMEOUT.as_secs()
}

fn default_read_timeout_ms() -> u64 {
    polarsync_device::DEFAULT_READ_TIMEOUT.as_millis() as u64
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            device: DeviceConfig::default(),
            sync: SyncConfig::default(),
        }
    }
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            backend: Backend::default(),
            serial_device: None,
            request_timeout_secs: default_request_timeout_secs(),
            read_timeout_ms: default_read_timeout_ms(),
        }
    }
}

impl DeviceConfig {
    /// Connection options sharing `cancel` with the caller.
    pub fn connect_options(&self, cancel: CancelFlag) -> ConnectOptions {
        ConnectOptions {
            backend: self.backend,
            serial_device: self.serial_device.clone(),
            link: LinkOptions {
                request_timeout: Duration::from_secs(self.request_timeout_secs),
                read_timeout: Duration::from_millis(self.read_timeout_ms),
                cancel,
            },
        }
    }
}

impl Config {
    /// Load configuration from all sources
    pub fn load(config_file: Option<&PathBuf>) -> Result<Self, figment::Error> {
        let mut figment = Figment::new().merge(Serialized::defaults(Config::default()));

        if let Some(path) = config_file {
            figment = figment.merge(Toml::file(path));
        } else {
            let default_paths = [
                PathBuf::from("/etc/polarsync/config.toml"),
                dirs::config_dir()
                    .unwrap_or_default()
                    .join("polarsync/config.toml"),
            ];

            for path in &default_paths {
                if path.exists() {
                    figment = figment.merge(Toml::file(path));
                    break;
                }
            }
        }

        figment = figment.merge(Env::prefixed("POLARSYNC_").split("__"));

        figment.extract()
    }

    /// Override log level from CLI
    pub fn with_log_level(mut self, log_level: Option<String>) -> Self {
        if let Some(level) = log_level {
            self.log_level = level;
        }
        self
    }

    /// Override backend from CLI
    pub fn with_backend(mut self, backend: Option<Backend>) -> Self {
        if let Some(backend) = backend {
            self.device.backend = backend;
        }
        self
    }

    /// Override ACM serial device from CLI
    pub fn with_serial_device(mut self, serial_device: Option<PathBuf>) -> Self {
        if serial_device.is_some() {
            self.device.serial_device = serial_device;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.device.backend, Backend::Auto);
        assert_eq!(config.device.request_timeout_secs, 30);
        assert_eq!(config.device.read_timeout_ms, 100);
        assert!(config.sync.root.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
log_level = "debug"

[device]
backend = "acm"
serial_device = "/dev/ttyACM2"
request_timeout_secs = 5

[sync]
root = "/srv/polar"
"#
        )
        .unwrap();

        let config = Config::load(Some(&file.path().to_path_buf())).unwrap();
        assert_eq!(config.device.backend, Backend::Acm);
        assert_eq!(config.device.serial_device, Some(PathBuf::from("/dev/ttyACM2")));
        assert_eq!(config.device.request_timeout_secs, 5);
        assert_eq!(config.device.read_timeout_ms, 100);
        assert_eq!(config.sync.root, Some(PathBuf::from("/srv/polar")));
    }

    #[test]
    fn test_cli_overrides() {
        let config = Config::default()
            .with_log_level(Some("trace".to_string()))
            .with_backend(Some(Backend::Hid))
            .with_serial_device(Some(PathBuf::from("/dev/ttyACM1")));
        assert_eq!(config.log_level, "trace");
        assert_eq!(config.device.backend, Backend::Hid);
        assert_eq!(config.device.serial_device, Some(PathBuf::from("/dev/ttyACM1")));

        let unchanged = config.clone().with_backend(None).with_serial_device(None);
        assert_eq!(unchanged.device.backend, Backend::Hid);
        assert!(unchanged.device.serial_device.is_some());
    }

    #[test]
    fn test_connect_options() {
        let cancel = CancelFlag::new();
        let device = DeviceConfig {
            read_timeout_ms: 250,
            ..DeviceConfig::default()
        };
        let options = device.connect_options(cancel.clone());
        assert_eq!(options.link.read_timeout, Duration::from_millis(250));
        assert_eq!(options.link.request_timeout, Duration::from_secs(30));

        cancel.cancel();
        assert!(options.link.cancel.is_cancelled());
    }
}
