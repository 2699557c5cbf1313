//! Command-line interface for linkprobe.
//!
//! Every option that also exists in the config file is optional here; when
//! given it overrides the file.

use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand, ValueEnum};

/// linkprobe - wireless loss and latency prober
#[derive(Parser, Debug)]
#[command(
    name = "linkprobe",
    author,
    version,
    about = "Measure one-way wireless loss and round-trip latency over a wired return path",
    long_about = r#"
linkprobe measures packet loss and latency of a wireless link between two
hosts that are also connected by a wired network:

  - the mobile node sends numbered, timestamped UDP probes over Wi-Fi
  - the fixed node logs each arrival and reflects it over Ethernet
  - the mobile node matches reflections and computes loss and latency

QUICK START:
  Fixed:   linkprobe fixed --fixed-wifi 192.168.1.10 --fixed-eth 10.0.0.10 --mobile-eth 10.0.0.20
  Mobile:  linkprobe mobile --mobile-wifi 192.168.1.20 --fixed-wifi 192.168.1.10 \
             --mobile-eth 10.0.0.20 --fixed-eth 10.0.0.10
  Blast:   linkprobe blast 192.168.1.10 --duration 10s
"#
)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, global = true, default_value = "info")]
    pub log_level: String,

    /// Output format
    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Disable colored output
    #[arg(long, global = true)]
    pub no_color: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Send probes over Wi-Fi and measure reflections arriving over Ethernet
    Mobile(MobileArgs),

    /// Log probes arriving over Wi-Fi and reflect them over Ethernet
    Fixed(FixedArgs),

    /// Send filler packets to a host for a throughput test
    Blast(BlastArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),

    /// Show example configuration
    Config(ConfigArgs),
}

/// Parameters shared by the mobile and fixed roles.
#[derive(Args, Debug, Clone, Default)]
pub struct PathArgs {
    /// Mobile node Wi-Fi address
    #[arg(long)]
    pub mobile_wifi: Option<IpAddr>,

    /// Mobile node Ethernet address
    #[arg(long)]
    pub mobile_eth: Option<IpAddr>,

    /// Fixed node Wi-Fi address
    #[arg(long)]
    pub fixed_wifi: Option<IpAddr>,

    /// Fixed node Ethernet address
    #[arg(long)]
    pub fixed_eth: Option<IpAddr>,

    /// Local Wi-Fi interface to bind to (e.g. wlan0)
    #[arg(long)]
    pub wifi_interface: Option<String>,

    /// Local Ethernet interface to bind to (e.g. eth0)
    #[arg(long)]
    pub eth_interface: Option<String>,

    /// UDP port used on every socket
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Test duration (e.g. 60s, 5m)
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Interval between probes (e.g. 1ms, 500us)
    #[arg(short, long, value_parser = parse_duration)]
    pub interval: Option<Duration>,

    /// Directory for CSV results
    #[arg(short, long)]
    pub output_dir: Option<PathBuf>,

    /// Do not write CSV results
    #[arg(long)]
    pub no_export: bool,
}

/// Mobile role arguments
#[derive(Args, Debug)]
pub struct MobileArgs {
    #[command(flatten)]
    pub path: PathArgs,

    /// Probe size in bytes (minimum 12)
    #[arg(short = 's', long)]
    pub packet_size: Option<usize>,

    /// Send exactly this many probes (still capped by --duration)
    #[arg(short = 'n', long)]
    pub count: Option<u64>,

    /// Keep listening this long after the last probe
    #[arg(long, value_parser = parse_duration)]
    pub linger: Option<Duration>,
}

/// Fixed role arguments
#[derive(Args, Debug)]
pub struct FixedArgs {
    #[command(flatten)]
    pub path: PathArgs,

    /// Port reflections are sent to (defaults to --port)
    #[arg(long)]
    pub return_port: Option<u16>,
}

/// Blast arguments
#[derive(Args, Debug)]
pub struct BlastArgs {
    /// Destination host, optionally with port
    pub host: String,

    /// Destination port when not given with the host
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Packet size in bytes
    #[arg(short = 's', long, default_value = "1024")]
    pub packet_size: usize,

    /// Test duration (e.g. 10s)
    #[arg(short, long, value_parser = parse_duration)]
    pub duration: Option<Duration>,

    /// Interval between packets; 0 sends back to back
    #[arg(short, long, value_parser = parse_duration, default_value = "0s")]
    pub interval: Duration,

    /// Local interface to bind to
    #[arg(long)]
    pub interface: Option<String>,
}

/// Completions command arguments
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Shell to generate completions for
    pub shell: Shell,
}

/// Config command arguments
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Output path
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

/// Output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

/// Shell for completions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}

fn parse_duration(s: &str) -> Result<Duration, humantime::DurationError> {
    humantime::parse_duration(s)
}
