//! Configuration management for linkprobe.
//!
//! Everything here can also be given on the command line; command-line values
//! win over the file.

use std::net::{IpAddr, Ipv4Addr};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::protocol;
use crate::transport::TransportConfig;
use crate::DEFAULT_PORT;

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Test parameters.
    #[serde(default)]
    pub probe: ProbeConfig,

    /// Host addresses and interfaces.
    #[serde(default)]
    pub addresses: AddressConfig,

    /// Socket configuration.
    #[serde(default)]
    pub transport: TransportConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("Failed to read config: {e}")))?;

        let config: Self = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {e}")))?;

        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;

        std::fs::write(path.as_ref(), content)
            .map_err(|e| Error::Config(format!("Failed to write config: {e}")))?;

        Ok(())
    }

    /// Validate configuration.
    pub fn validate(&self) -> Result<()> {
        self.probe.validate()
    }

    /// Get default config path.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("org", "linkprobe", "linkprobe").map_or_else(
            || PathBuf::from("linkprobe.toml"),
            |dirs| dirs.config_dir().join("config.toml"),
        )
    }

    /// Create example configuration.
    pub fn example() -> Self {
        Self {
            addresses: AddressConfig {
                mobile_wifi: Some(Ipv4Addr::new(192, 168, 1, 20).into()),
                mobile_ethernet: Some(Ipv4Addr::new(10, 0, 0, 20).into()),
                fixed_wifi: Some(Ipv4Addr::new(192, 168, 1, 10).into()),
                fixed_ethernet: Some(Ipv4Addr::new(10, 0, 0, 10).into()),
                wifi_interface: Some("wlan0".into()),
                ethernet_interface: Some("eth0".into()),
            },
            ..Default::default()
        }
    }
}

/// Test parameters shared by all roles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProbeConfig {
    /// UDP port used on every socket.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Datagram size in bytes.
    #[serde(default = "default_packet_size")]
    pub packet_size: usize,

    /// Delay between consecutive sends.
    #[serde(default = "default_interval", with = "humantime_serde")]
    pub interval: Duration,

    /// Test duration.
    #[serde(default = "default_duration", with = "humantime_serde")]
    pub duration: Duration,

    /// Stop after this many probes (mobile role); the duration still caps
    /// the run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u64>,

    /// Extra listening time after the last probe (mobile role).
    #[serde(default, with = "humantime_serde")]
    pub linger: Duration,

    /// Directory for CSV results.
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Write CSV results (the fixed role streams its reception log).
    #[serde(default = "default_export")]
    pub export: bool,
}

fn default_port() -> u16 {
    DEFAULT_PORT
}
fn default_packet_size() -> usize {
    64
}
fn default_interval() -> Duration {
    Duration::from_millis(1)
}
fn default_duration() -> Duration {
    Duration::from_secs(60)
}
fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}
fn default_export() -> bool {
    true
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            packet_size: default_packet_size(),
            interval: default_interval(),
            duration: default_duration(),
            count: None,
            linger: Duration::ZERO,
            output_dir: default_output_dir(),
            export: default_export(),
        }
    }
}

impl ProbeConfig {
    pub fn validate(&self) -> Result<()> {
        if self.port == 0 {
            return Err(Error::InvalidConfig("port must be non-zero".into()));
        }
        if self.duration.is_zero() {
            return Err(Error::InvalidConfig(
                "duration must be greater than zero".into(),
            ));
        }
        protocol::check_packet_size(self.packet_size)
            .map_err(|e| Error::InvalidConfig(e.to_string()))?;
        Ok(())
    }
}

/// Addresses of both hosts on both paths.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AddressConfig {
    /// Mobile node, wireless side.
    pub mobile_wifi: Option<IpAddr>,
    /// Mobile node, wired side.
    pub mobile_ethernet: Option<IpAddr>,
    /// Fixed node, wireless side.
    pub fixed_wifi: Option<IpAddr>,
    /// Fixed node, wired side.
    pub fixed_ethernet: Option<IpAddr>,
    /// Local wireless interface to pin sockets to.
    pub wifi_interface: Option<String>,
    /// Local wired interface to pin sockets to.
    pub ethernet_interface: Option<String>,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level.
    #[serde(default = "default_log_level")]
    pub level: String,

    /// Log format (text or json).
    #[serde(default = "default_log_format")]
    pub format: String,

    /// Enable colored output.
    #[serde(default = "default_color")]
    pub color: bool,
}

fn default_log_level() -> String {
    "info".into()
}
fn default_log_format() -> String {
    "text".into()
}
fn default_color() -> bool {
    true
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            color: default_color(),
        }
    }
}

/// Initialize logging.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.format == "json" {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_ansi(config.color)
                    .with_writer(std::io::stderr),
            )
            .try_init()
            .map_err(|e| Error::Config(format!("Failed to init logging: {e}")))?;
    }

    Ok(())
}
