//! Test sessions: socket setup, task orchestration and shutdown per role.
//!
//! Setup errors (bad settings, bind failures) surface from `bind` before any
//! loop starts. Once running, a session always produces a report: deadline
//! expiry and interruption take the same path.

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr};
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::info;

use super::receive::{run_receiver, ReceiverConfig, ReceiverStats};
use super::reflect::{run_reflector, ReflectorConfig, ReflectorReport};
use super::transmit::{run_transmit, PayloadKind, TransmitConfig, TransmitReport};
use super::{MeasurementReport, StopFlag, StopReason};
use crate::error::{Error, Result};
use crate::protocol::{self, MAX_PACKET_SIZE};
use crate::report::ReceptionLog;
use crate::transport::{SocketConfig, TransportConfig, UdpTransport};
use crate::types::{Bandwidth, LatencyStats, Role};
use crate::util;

fn validate_duration(role: Role, duration: Duration) -> Result<()> {
    if duration.is_zero() {
        return Err(Error::InvalidConfig(format!(
            "{role}: test duration must be greater than zero"
        )));
    }
    Ok(())
}

fn validate_destination(role: Role, what: &str, addr: SocketAddr) -> Result<()> {
    if addr.port() == 0 || addr.ip().is_unspecified() {
        return Err(Error::InvalidConfig(format!(
            "{role}: {what} {addr} is not a usable destination"
        )));
    }
    Ok(())
}

fn bind_path(
    addr: SocketAddr,
    interface: Option<&str>,
    transport: &TransportConfig,
) -> Result<UdpTransport> {
    if let Some(name) = interface {
        util::check_interface(name)?;
    }
    let config = SocketConfig::from_transport_config(transport).with_optional_interface(interface);
    UdpTransport::bind(addr, &config)
}

fn join_error(task: &str, e: tokio::task::JoinError) -> Error {
    Error::Internal(format!("{task} task failed: {e}"))
}

// ============================================================================
// Mobile
// ============================================================================

/// Mobile role parameters.
#[derive(Debug, Clone)]
pub struct MobileSettings {
    /// Local Wi-Fi address probes are sent from.
    pub wifi_bind: SocketAddr,
    /// Local Ethernet address reflections arrive on.
    pub ethernet_bind: SocketAddr,
    pub wifi_interface: Option<String>,
    pub ethernet_interface: Option<String>,
    /// Fixed node's Wi-Fi address.
    pub destination: SocketAddr,
    /// Fixed node's Ethernet address; the only accepted reflection source.
    pub reflector: IpAddr,
    pub packet_size: usize,
    pub interval: Duration,
    pub duration: Duration,
    /// Stop sending after this many probes.
    pub count: Option<u64>,
    /// Extra listening time after the last probe for in-flight reflections.
    pub linger: Duration,
}

impl MobileSettings {
    pub fn validate(&self) -> Result<()> {
        protocol::check_packet_size(self.packet_size)?;
        validate_duration(Role::Mobile, self.duration)?;
        validate_destination(Role::Mobile, "fixed Wi-Fi address", self.destination)?;
        if self.count == Some(0) {
            return Err(Error::InvalidConfig(
                "mobile: probe count must be greater than zero".into(),
            ));
        }
        Ok(())
    }
}

/// Final output of a mobile run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MobileReport {
    pub measurement: MeasurementReport,
    /// `None` when no reflection came back.
    pub latency: Option<LatencyStats>,
    pub transmit: TransmitReport,
    pub receiver: ReceiverStats,
    pub stop_reason: StopReason,
}

/// Mobile node: probes out over Wi-Fi, reflections back over Ethernet.
#[derive(Debug)]
pub struct MobileSession {
    wifi: UdpTransport,
    ethernet: UdpTransport,
    settings: MobileSettings,
    poll_timeout: Duration,
}

impl MobileSession {
    /// Validate settings and bind both sockets.
    pub fn bind(settings: MobileSettings, transport: &TransportConfig) -> Result<Self> {
        settings.validate()?;

        let wifi = bind_path(settings.wifi_bind, settings.wifi_interface.as_deref(), transport)?;
        let ethernet = bind_path(
            settings.ethernet_bind,
            settings.ethernet_interface.as_deref(),
            transport,
        )?;

        info!(
            "Mobile sockets ready: Wi-Fi {}, Ethernet {}",
            wifi.local_addr(),
            ethernet.local_addr()
        );

        Ok(Self {
            wifi,
            ethernet,
            poll_timeout: transport.poll_timeout(settings.interval),
            settings,
        })
    }

    pub fn wifi_addr(&self) -> SocketAddr {
        self.wifi.local_addr()
    }

    pub fn ethernet_addr(&self) -> SocketAddr {
        self.ethernet.local_addr()
    }

    /// Run transmit and receive loops concurrently until the deadline or
    /// `stop`, then join both and compute the result.
    pub async fn run(self, stop: StopFlag) -> Result<MobileReport> {
        let Self {
            wifi,
            ethernet,
            settings,
            poll_timeout,
        } = self;

        let deadline = Instant::now() + settings.duration;

        let receiver = tokio::spawn(run_receiver(
            ethernet,
            ReceiverConfig {
                expected_source: settings.reflector,
                poll_timeout,
            },
            stop.clone(),
        ));

        let transmit_config = TransmitConfig {
            destination: settings.destination,
            packet_size: settings.packet_size,
            interval: settings.interval,
            deadline,
            max_packets: settings.count,
            payload: PayloadKind::Probe,
        };
        let transmit_stop = stop.clone();
        let transmitter =
            tokio::spawn(async move { run_transmit(&wifi, &transmit_config, &transmit_stop).await });

        let transmit = transmitter
            .await
            .map_err(|e| join_error("transmit", e))?;

        if !settings.linger.is_zero() && !stop.is_stopped() {
            tokio::select! {
                _ = tokio::time::sleep(settings.linger) => {}
                _ = stop.wait() => {}
            }
        }
        stop.stop(StopReason::Deadline);

        // Aggregates are only read after the receive task has fully exited.
        let (aggregator, receiver_stats) = receiver
            .await
            .map_err(|e| join_error("receive", e))?;

        let measurement = aggregator.finish(transmit.total_sent);
        Ok(MobileReport {
            latency: measurement.latency_stats(),
            measurement,
            transmit,
            receiver: receiver_stats,
            stop_reason: stop.reason().unwrap_or(StopReason::Deadline),
        })
    }
}

// ============================================================================
// Fixed
// ============================================================================

/// Fixed role parameters.
#[derive(Debug, Clone)]
pub struct FixedSettings {
    /// Local Wi-Fi address probes arrive on.
    pub wifi_bind: SocketAddr,
    /// Local Ethernet address reflections are sent from.
    pub ethernet_bind: SocketAddr,
    pub wifi_interface: Option<String>,
    pub ethernet_interface: Option<String>,
    /// Mobile node's Ethernet address and port.
    pub return_addr: SocketAddr,
    /// Sender's pacing interval; sizes the receive poll.
    pub interval: Duration,
    pub duration: Duration,
    /// CSV file the reception log is streamed to. Without one, records are
    /// kept in the report.
    pub reception_log: Option<PathBuf>,
}

impl FixedSettings {
    pub fn validate(&self) -> Result<()> {
        validate_duration(Role::Fixed, self.duration)?;
        validate_destination(Role::Fixed, "mobile Ethernet address", self.return_addr)?;
        Ok(())
    }
}

/// Final output of a fixed run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FixedReport {
    pub reflector: ReflectorReport,
    pub elapsed: Duration,
    pub stop_reason: StopReason,
}

/// Fixed node: probes in over Wi-Fi, reflected back over Ethernet.
#[derive(Debug)]
pub struct FixedSession {
    wifi: UdpTransport,
    ethernet: UdpTransport,
    settings: FixedSettings,
    poll_timeout: Duration,
    log: Option<ReceptionLog>,
}

impl FixedSession {
    /// Validate settings and bind both sockets.
    pub fn bind(settings: FixedSettings, transport: &TransportConfig) -> Result<Self> {
        settings.validate()?;

        let wifi = bind_path(settings.wifi_bind, settings.wifi_interface.as_deref(), transport)?;
        let ethernet = bind_path(
            settings.ethernet_bind,
            settings.ethernet_interface.as_deref(),
            transport,
        )?;

        info!(
            "Fixed sockets ready: Wi-Fi {}, Ethernet {}",
            wifi.local_addr(),
            ethernet.local_addr()
        );

        let log = settings
            .reception_log
            .as_ref()
            .map(ReceptionLog::create)
            .transpose()?;

        Ok(Self {
            wifi,
            ethernet,
            poll_timeout: transport.poll_timeout(settings.interval),
            settings,
            log,
        })
    }

    pub fn wifi_addr(&self) -> SocketAddr {
        self.wifi.local_addr()
    }

    pub fn ethernet_addr(&self) -> SocketAddr {
        self.ethernet.local_addr()
    }

    /// Reflect until the deadline or `stop`, then join the reflector.
    pub async fn run(self, stop: StopFlag) -> Result<FixedReport> {
        let Self {
            wifi,
            ethernet,
            settings,
            poll_timeout,
            log,
        } = self;

        let started = Instant::now();
        let deadline = started + settings.duration;

        let reflector = tokio::spawn(run_reflector(
            wifi,
            ethernet,
            ReflectorConfig {
                return_addr: settings.return_addr,
                poll_timeout,
            },
            stop.clone(),
            started,
            log,
        ));

        tokio::select! {
            _ = tokio::time::sleep_until(deadline) => {
                info!("Test duration completed");
            }
            _ = stop.wait() => {}
        }
        stop.stop(StopReason::Deadline);

        let report = reflector
            .await
            .map_err(|e| join_error("reflect", e))?;

        Ok(FixedReport {
            reflector: report,
            elapsed: started.elapsed(),
            stop_reason: stop.reason().unwrap_or(StopReason::Deadline),
        })
    }
}

// ============================================================================
// Blast
// ============================================================================

/// Sender-only throughput test parameters.
#[derive(Debug, Clone)]
pub struct BlastSettings {
    pub destination: SocketAddr,
    pub interface: Option<String>,
    pub packet_size: usize,
    /// Zero sends back to back.
    pub interval: Duration,
    pub duration: Duration,
}

impl BlastSettings {
    pub fn validate(&self) -> Result<()> {
        if self.packet_size == 0 || self.packet_size > MAX_PACKET_SIZE {
            return Err(Error::InvalidConfig(format!(
                "blast: packet size must be between 1 and {MAX_PACKET_SIZE} bytes, got {}",
                self.packet_size
            )));
        }
        validate_duration(Role::Blast, self.duration)?;
        validate_destination(Role::Blast, "destination", self.destination)?;
        Ok(())
    }
}

/// Final output of a blast run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlastReport {
    pub transmit: TransmitReport,
    pub throughput: Bandwidth,
    pub stop_reason: StopReason,
}

/// Sender-only session.
#[derive(Debug)]
pub struct BlastSession {
    socket: UdpTransport,
    settings: BlastSettings,
}

impl BlastSession {
    /// Validate settings and bind an ephemeral socket of the right family.
    pub fn bind(settings: BlastSettings, transport: &TransportConfig) -> Result<Self> {
        settings.validate()?;

        let any: IpAddr = if settings.destination.is_ipv6() {
            Ipv6Addr::UNSPECIFIED.into()
        } else {
            Ipv4Addr::UNSPECIFIED.into()
        };
        let socket = bind_path(
            SocketAddr::new(any, 0),
            settings.interface.as_deref(),
            transport,
        )?;

        Ok(Self { socket, settings })
    }

    pub async fn run(self, stop: StopFlag) -> Result<BlastReport> {
        let config = TransmitConfig {
            destination: self.settings.destination,
            packet_size: self.settings.packet_size,
            interval: self.settings.interval,
            deadline: Instant::now() + self.settings.duration,
            max_packets: None,
            payload: PayloadKind::Filler,
        };

        let transmit = run_transmit(&self.socket, &config, &stop).await;
        stop.stop(StopReason::Deadline);

        Ok(BlastReport {
            throughput: Bandwidth::from_transfer(transmit.bytes_sent, transmit.elapsed),
            transmit,
            stop_reason: stop.reason().unwrap_or(StopReason::Deadline),
        })
    }
}
