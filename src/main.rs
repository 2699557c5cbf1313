//! linkprobe CLI - wireless loss and latency prober.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tokio::time::Instant;

use linkprobe::cli::*;
use linkprobe::config::{init_logging, Config, LoggingConfig};
use linkprobe::error::{Error, Result};
use linkprobe::probe::{
    BlastReport, BlastSession, BlastSettings, FixedReport, FixedSession, FixedSettings,
    MobileReport, MobileSession, MobileSettings, StopFlag, StopReason,
};
use linkprobe::report::{self, ExportPaths};
use linkprobe::util;
use linkprobe::{Role, VERSION};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.no_color {
        colored::control::set_override(false);
    }

    // Initialize logging
    let log_config = LoggingConfig {
        level: cli.log_level.clone(),
        format: match cli.format {
            OutputFormat::Json => "json".into(),
            OutputFormat::Text => "text".into(),
        },
        color: !cli.no_color,
    };
    init_logging(&log_config)?;

    // Load config if specified
    let config = if let Some(ref path) = cli.config {
        Config::load(path)?
    } else if Config::default_path().exists() {
        Config::load(Config::default_path())?
    } else {
        Config::default()
    };

    let format = cli.format;
    match cli.command {
        Commands::Mobile(args) => run_mobile(args, config, format).await,
        Commands::Fixed(args) => run_fixed(args, config, format).await,
        Commands::Blast(args) => run_blast(args, config, format).await,
        Commands::Completions(args) => run_completions(args),
        Commands::Config(args) => run_config(args),
    }
}

/// Run the mobile role
async fn run_mobile(args: MobileArgs, mut config: Config, format: OutputFormat) -> Result<()> {
    apply_path_args(&mut config, &args.path);
    if let Some(size) = args.packet_size {
        config.probe.packet_size = size;
    }
    if let Some(linger) = args.linger {
        config.probe.linger = linger;
    }
    if args.count.is_some() {
        config.probe.count = args.count;
    }
    config.validate()?;

    let addrs = &config.addresses;
    let probe = &config.probe;
    let settings = MobileSettings {
        wifi_bind: SocketAddr::new(require(addrs.mobile_wifi, "--mobile-wifi")?, probe.port),
        ethernet_bind: SocketAddr::new(require(addrs.mobile_ethernet, "--mobile-eth")?, probe.port),
        wifi_interface: addrs.wifi_interface.clone(),
        ethernet_interface: addrs.ethernet_interface.clone(),
        destination: SocketAddr::new(require(addrs.fixed_wifi, "--fixed-wifi")?, probe.port),
        reflector: require(addrs.fixed_ethernet, "--fixed-eth")?,
        packet_size: probe.packet_size,
        interval: probe.interval,
        duration: probe.duration,
        count: probe.count,
        linger: probe.linger,
    };

    let text = format == OutputFormat::Text;
    if text {
        print_banner(Role::Mobile);
        println!("  {} {}", "Probes to:".bright_white(), settings.destination);
        println!("  {} {}", "Reflector:".bright_white(), settings.reflector);
        println!(
            "  {} {} bytes every {:?} for {}",
            "Pattern:".bright_white(),
            settings.packet_size,
            settings.interval,
            util::format_duration(settings.duration)
        );
        if let Some(count) = settings.count {
            println!("  {} {} probes", "Count:".bright_white(), count);
        }
        println!();
    }
    warn_if_unprivileged(&config);

    let session = MobileSession::bind(settings, &config.transport)?;
    let stop = StopFlag::new();
    stop.install_ctrl_c_handler();

    let total = config.probe.duration + config.probe.linger;
    let report = run_with_progress(session.run(stop.clone()), total, text).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_mobile_summary(&report),
    }

    if config.probe.export {
        let paths = ExportPaths::in_dir(&config.probe.output_dir);
        report::export_mobile(&report, &paths)?;
        if text {
            println!(
                "{} Results written to {} and {}",
                "✓".green(),
                paths.loss.display(),
                paths.latency.display()
            );
        }
    }

    Ok(())
}

/// Run the fixed role
async fn run_fixed(args: FixedArgs, mut config: Config, format: OutputFormat) -> Result<()> {
    apply_path_args(&mut config, &args.path);
    config.validate()?;

    let addrs = &config.addresses;
    let probe = &config.probe;
    let settings = FixedSettings {
        wifi_bind: SocketAddr::new(require(addrs.fixed_wifi, "--fixed-wifi")?, probe.port),
        ethernet_bind: SocketAddr::new(require(addrs.fixed_ethernet, "--fixed-eth")?, probe.port),
        wifi_interface: addrs.wifi_interface.clone(),
        ethernet_interface: addrs.ethernet_interface.clone(),
        return_addr: SocketAddr::new(
            require(addrs.mobile_ethernet, "--mobile-eth")?,
            args.return_port.unwrap_or(probe.port),
        ),
        interval: probe.interval,
        duration: probe.duration,
        reception_log: probe
            .export
            .then(|| ExportPaths::in_dir(&probe.output_dir).reception),
    };

    let text = format == OutputFormat::Text;
    if text {
        print_banner(Role::Fixed);
        println!("  {} {}", "Listening:".bright_white(), settings.wifi_bind);
        println!("  {} {}", "Reflecting to:".bright_white(), settings.return_addr);
        println!(
            "  {} {}",
            "Duration:".bright_white(),
            util::format_duration(settings.duration)
        );
        if let Some(ref path) = settings.reception_log {
            println!("  {} {}", "Logging to:".bright_white(), path.display());
        }
        println!();
    }
    warn_if_unprivileged(&config);

    let reception_log = settings.reception_log.clone();
    let session = FixedSession::bind(settings, &config.transport)?;
    let stop = StopFlag::new();
    stop.install_ctrl_c_handler();

    let report = run_with_progress(session.run(stop.clone()), config.probe.duration, text).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_fixed_summary(&report),
    }

    if let (Some(path), true) = (reception_log, text) {
        println!(
            "{} {} rows written to {}",
            "✓".green(),
            report.reflector.logged,
            path.display()
        );
    }

    Ok(())
}

/// Run a sender-only throughput test
async fn run_blast(args: BlastArgs, config: Config, format: OutputFormat) -> Result<()> {
    let port = args.port.unwrap_or(config.probe.port);
    let destination = util::parse_addr_with_default_port(&args.host, port)
        .map_err(|e| Error::InvalidConfig(format!("invalid host '{}': {e}", args.host)))?;

    let settings = BlastSettings {
        destination,
        interface: args
            .interface
            .or_else(|| config.addresses.wifi_interface.clone()),
        packet_size: args.packet_size,
        interval: args.interval,
        duration: args.duration.unwrap_or(config.probe.duration),
    };

    let text = format == OutputFormat::Text;
    if text {
        print_banner(Role::Blast);
        println!("  {} {}", "Target:".bright_white(), settings.destination);
        println!(
            "  {} {} bytes for {}",
            "Pattern:".bright_white(),
            settings.packet_size,
            util::format_duration(settings.duration)
        );
        println!();
    }

    let duration = settings.duration;
    let session = BlastSession::bind(settings, &config.transport)?;
    let stop = StopFlag::new();
    stop.install_ctrl_c_handler();

    let report = run_with_progress(session.run(stop.clone()), duration, text).await?;

    match format {
        OutputFormat::Json => print_json(&report)?,
        OutputFormat::Text => print_blast_summary(&report),
    }

    Ok(())
}

/// Generate shell completions
fn run_completions(args: CompletionsArgs) -> Result<()> {
    use clap::CommandFactory;
    use clap_complete::generate;

    let mut cmd = Cli::command();
    let name = cmd.get_name().to_string();

    let shell = match args.shell {
        Shell::Bash => clap_complete::Shell::Bash,
        Shell::Zsh => clap_complete::Shell::Zsh,
        Shell::Fish => clap_complete::Shell::Fish,
        Shell::PowerShell => clap_complete::Shell::PowerShell,
    };

    generate(shell, &mut cmd, name, &mut std::io::stdout());

    Ok(())
}

/// Show example configuration
fn run_config(args: ConfigArgs) -> Result<()> {
    let config = Config::example();

    if let Some(ref path) = args.output {
        config.save(path)?;
        println!(
            "{} Configuration written to {}",
            "✓".green(),
            path.display()
        );
    } else {
        let output = toml::to_string_pretty(&config)
            .map_err(|e| Error::Config(format!("Failed to serialize config: {e}")))?;
        println!("{output}");
    }

    Ok(())
}

// ============================================================================
// Helpers
// ============================================================================

/// Command-line values override the config file.
fn apply_path_args(config: &mut Config, args: &PathArgs) {
    let addrs = &mut config.addresses;
    addrs.mobile_wifi = args.mobile_wifi.or(addrs.mobile_wifi);
    addrs.mobile_ethernet = args.mobile_eth.or(addrs.mobile_ethernet);
    addrs.fixed_wifi = args.fixed_wifi.or(addrs.fixed_wifi);
    addrs.fixed_ethernet = args.fixed_eth.or(addrs.fixed_ethernet);
    if let Some(ref name) = args.wifi_interface {
        addrs.wifi_interface = Some(name.clone());
    }
    if let Some(ref name) = args.eth_interface {
        addrs.ethernet_interface = Some(name.clone());
    }

    let probe = &mut config.probe;
    if let Some(port) = args.port {
        probe.port = port;
    }
    if let Some(duration) = args.duration {
        probe.duration = duration;
    }
    if let Some(interval) = args.interval {
        probe.interval = interval;
    }
    if let Some(ref dir) = args.output_dir {
        probe.output_dir = dir.clone();
    }
    if args.no_export {
        probe.export = false;
    }
}

fn require(addr: Option<IpAddr>, flag: &str) -> Result<IpAddr> {
    addr.ok_or_else(|| {
        Error::Config(format!(
            "missing address: pass {flag} or set it under [addresses] in the config file"
        ))
    })
}

fn warn_if_unprivileged(config: &Config) {
    let pinned = config.addresses.wifi_interface.is_some()
        || config.addresses.ethernet_interface.is_some();
    if pinned && !util::is_root() {
        println!(
            "{} Binding to an interface usually needs root or CAP_NET_RAW",
            "⚠".yellow()
        );
    }
}

/// Drive a session while ticking a remaining-time bar once per second.
async fn run_with_progress<T, F>(session: F, duration: Duration, show: bool) -> Result<T>
where
    T: Send + 'static,
    F: Future<Output = Result<T>> + Send + 'static,
{
    let secs = duration.as_secs().max(1);
    let pb = if show {
        ProgressBar::new(secs)
    } else {
        ProgressBar::hidden()
    };
    if let Ok(style) =
        ProgressStyle::default_bar().template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len}s {msg}")
    {
        pb.set_style(style.progress_chars("█▓░"));
    }

    let started = Instant::now();
    let mut task = tokio::spawn(session);
    let mut ticker = tokio::time::interval(Duration::from_secs(1));

    let result = loop {
        tokio::select! {
            joined = &mut task => {
                break joined.map_err(|e| Error::Internal(format!("session task failed: {e}")))?;
            }
            _ = ticker.tick() => {
                pb.set_position(started.elapsed().as_secs().min(secs));
            }
        }
    };

    pb.finish_and_clear();
    result
}

fn print_banner(role: Role) {
    println!(
        "{}",
        "╔══════════════════════════════════════════╗".bright_cyan()
    );
    println!(
        "{}",
        format!("║     LINKPROBE {:<27}║", role.as_str().to_uppercase()).bright_cyan()
    );
    println!(
        "{}",
        format!("║     Version {VERSION:<29}║").bright_cyan()
    );
    println!(
        "{}",
        "╚══════════════════════════════════════════╝".bright_cyan()
    );
    println!();
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let output = serde_json::to_string_pretty(value)
        .map_err(|e| Error::Internal(format!("Failed to serialize report: {e}")))?;
    println!("{output}");
    Ok(())
}

fn print_stop_reason(reason: StopReason) {
    if reason == StopReason::Interrupted {
        println!("{} Test interrupted before the deadline", "⚠".yellow());
    }
}

fn print_mobile_summary(report: &MobileReport) {
    let m = &report.measurement;
    print_stop_reason(report.stop_reason);
    println!("{}", "Results:".bright_white().bold());
    println!("  {} {}", "Sent:    ".bright_white(), m.total_sent);
    println!("  {} {}", "Received:".bright_white(), m.total_received);

    let loss = format!("{:.2}%", m.packet_loss_pct);
    let loss = if m.packet_loss_pct <= 0.0 {
        loss.green()
    } else if m.packet_loss_pct < 5.0 {
        loss.yellow()
    } else {
        loss.red()
    };
    println!("  {} {}", "Loss:    ".bright_white(), loss);

    match report.latency {
        Some(ref stats) => {
            println!("  {} {}", "Latency: ".bright_white(), stats.as_human_readable().cyan());
        }
        None => println!("  {} {}", "Latency: ".bright_white(), "no reflections".dimmed()),
    }

    if report.transmit.send_errors > 0 {
        println!(
            "  {} {} sends failed locally",
            "⚠".yellow(),
            report.transmit.send_errors
        );
    }
    if report.receiver.foreign > 0 || report.receiver.malformed > 0 {
        println!(
            "  {} ignored {} foreign and {} malformed datagrams",
            "○".dimmed(),
            report.receiver.foreign,
            report.receiver.malformed
        );
    }
    println!();
}

fn print_fixed_summary(report: &FixedReport) {
    let r = &report.reflector;
    print_stop_reason(report.stop_reason);
    println!("{}", "Results:".bright_white().bold());
    println!("  {} {}", "Received: ".bright_white(), r.packets_received);
    println!(
        "  {} {}",
        "Bytes:    ".bright_white(),
        util::format_bytes(r.bytes_received)
    );
    println!("  {} {}", "Reflected:".bright_white(), r.reflected);
    println!(
        "  {} {}",
        "Elapsed:  ".bright_white(),
        util::format_duration(report.elapsed)
    );
    if r.undecoded > 0 {
        println!("  {} {} datagrams could not be decoded", "⚠".yellow(), r.undecoded);
    }
    if r.reflect_errors > 0 {
        println!("  {} {} reflections failed", "⚠".yellow(), r.reflect_errors);
    }
    if r.log_errors > 0 {
        println!("  {} {} log rows could not be written", "⚠".yellow(), r.log_errors);
    }
    println!();
}

fn print_blast_summary(report: &BlastReport) {
    let t = &report.transmit;
    print_stop_reason(report.stop_reason);
    println!("{}", "Results:".bright_white().bold());
    println!("  {} {}", "Packets:   ".bright_white(), t.total_sent);
    println!(
        "  {} {}",
        "Bytes:     ".bright_white(),
        util::format_bytes(t.bytes_sent)
    );
    println!(
        "  {} {}",
        "Throughput:".bright_white(),
        report.throughput.to_string().green()
    );
    if t.send_errors > 0 {
        println!("  {} {} sends failed", "⚠".yellow(), t.send_errors);
    }
    println!();
}
