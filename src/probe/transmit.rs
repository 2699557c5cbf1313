//! Open-loop transmit loop.
//!
//! One datagram per tick until the deadline or a stop request. Send failures
//! are counted and skipped, never retried.

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use super::StopFlag;
use crate::protocol::{self, ProbePacket};
use crate::transport::UdpTransport;

/// What goes into each datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadKind {
    /// Zero padding plus id/timestamp trailer.
    Probe,
    /// Constant filler bytes for throughput tests.
    Filler,
}

/// Transmit loop parameters.
#[derive(Debug, Clone)]
pub struct TransmitConfig {
    pub destination: SocketAddr,
    pub packet_size: usize,
    /// Spacing between sends. Zero sends as fast as the socket allows.
    pub interval: Duration,
    pub deadline: Instant,
    /// Stop after this many packets even if the deadline is further out.
    pub max_packets: Option<u64>,
    pub payload: PayloadKind,
}

/// What the transmit loop did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransmitReport {
    /// Final counter value; includes sends that failed locally.
    pub total_sent: u64,
    pub send_errors: u64,
    pub bytes_sent: u64,
    pub elapsed: Duration,
}

/// Run the transmit loop to completion.
pub async fn run_transmit(
    socket: &UdpTransport,
    config: &TransmitConfig,
    stop: &StopFlag,
) -> TransmitReport {
    let mut buf = match config.payload {
        PayloadKind::Probe => vec![0u8; config.packet_size],
        PayloadKind::Filler => protocol::filler(config.packet_size),
    };

    info!(
        "Transmitting {}-byte packets to {} every {:?}",
        config.packet_size, config.destination, config.interval
    );

    let started = Instant::now();
    let mut report = TransmitReport::default();

    // Send n is due at `started + n * interval`; overdue sends go out
    // back to back until the loop is on schedule again.
    let mut next_send = started;

    while Instant::now() < config.deadline && !stop.is_stopped() {
        if config
            .max_packets
            .is_some_and(|max| report.total_sent >= max)
        {
            break;
        }

        // Ids wrap after 2^32 packets; the counter itself does not.
        let packet_id = report.total_sent as u32;
        if config.payload == PayloadKind::Probe {
            ProbePacket::stamped_now(packet_id).write_trailer(&mut buf);
        }

        match socket.send_to(&buf, config.destination).await {
            Ok(n) => {
                report.bytes_sent += n as u64;
                trace!(packet_id, "sent");
            }
            Err(e) => {
                report.send_errors += 1;
                if report.send_errors == 1 {
                    warn!("Send to {} failed: {}", config.destination, e);
                } else {
                    debug!(packet_id, "send failed: {}", e);
                }
            }
        }

        report.total_sent += 1;

        if config.interval.is_zero() {
            tokio::task::yield_now().await;
        } else {
            next_send += config.interval;
            tokio::time::sleep_until(next_send.min(config.deadline)).await;
        }
    }

    report.elapsed = started.elapsed();

    info!(
        "Transmit finished: {} sent, {} send errors in {:.1}s",
        report.total_sent,
        report.send_errors,
        report.elapsed.as_secs_f64()
    );

    report
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::StopReason;
    use crate::transport::{RecvOutcome, SocketConfig};

    fn bind() -> UdpTransport {
        UdpTransport::bind("127.0.0.1:0".parse().unwrap(), &SocketConfig::default()).unwrap()
    }

    #[tokio::test]
    async fn test_ids_are_sequential_from_zero() {
        let sender = bind();
        let sink = bind();

        let config = TransmitConfig {
            destination: sink.local_addr(),
            packet_size: 32,
            interval: Duration::from_millis(5),
            deadline: Instant::now() + Duration::from_millis(60),
            max_packets: None,
            payload: PayloadKind::Probe,
        };
        let report = run_transmit(&sender, &config, &StopFlag::new()).await;

        assert!(report.total_sent > 0);
        assert_eq!(report.send_errors, 0);
        assert_eq!(report.bytes_sent, report.total_sent * 32);

        let mut buf = [0u8; 128];
        for expected in 0..report.total_sent {
            let outcome = sink
                .recv_timeout(&mut buf, Duration::from_secs(1))
                .await
                .unwrap();
            let RecvOutcome::Datagram { len, .. } = outcome else {
                panic!("missing datagram {expected}");
            };
            assert_eq!(len, 32);
            let (id, _) = protocol::decode(&buf[..len]).unwrap();
            assert_eq!(u64::from(id), expected);
        }
    }

    #[tokio::test]
    async fn test_stop_flag_ends_loop() {
        let sender = bind();
        let sink = bind();
        let stop = StopFlag::new();
        stop.stop(StopReason::Interrupted);

        let config = TransmitConfig {
            destination: sink.local_addr(),
            packet_size: 16,
            interval: Duration::from_millis(1),
            deadline: Instant::now() + Duration::from_secs(60),
            max_packets: None,
            payload: PayloadKind::Probe,
        };
        let report = run_transmit(&sender, &config, &stop).await;
        assert_eq!(report.total_sent, 0);
    }

    #[tokio::test]
    async fn test_rate_follows_interval() {
        let sender = bind();
        let sink = bind();

        let interval = Duration::from_millis(1);
        let window = Duration::from_millis(500);
        let config = TransmitConfig {
            destination: sink.local_addr(),
            packet_size: 16,
            interval,
            deadline: Instant::now() + window,
            max_packets: None,
            payload: PayloadKind::Probe,
        };
        let report = run_transmit(&sender, &config, &StopFlag::new()).await;

        let target = (window.as_micros() / interval.as_micros()) as u64;
        assert!(
            report.total_sent >= target * 8 / 10,
            "sent {} of ~{target}",
            report.total_sent
        );
        assert!(report.total_sent <= target + 1, "sent {}", report.total_sent);
    }

    #[tokio::test]
    async fn test_max_packets_bounds_the_run() {
        let sender = bind();
        let sink = bind();

        let config = TransmitConfig {
            destination: sink.local_addr(),
            packet_size: 16,
            interval: Duration::ZERO,
            deadline: Instant::now() + Duration::from_secs(30),
            max_packets: Some(25),
            payload: PayloadKind::Probe,
        };
        let report = run_transmit(&sender, &config, &StopFlag::new()).await;
        assert_eq!(report.total_sent, 25);
        assert!(report.elapsed < Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_filler_payload() {
        let sender = bind();
        let sink = bind();

        let config = TransmitConfig {
            destination: sink.local_addr(),
            packet_size: 8,
            interval: Duration::from_millis(5),
            deadline: Instant::now() + Duration::from_millis(20),
            max_packets: None,
            payload: PayloadKind::Filler,
        };
        let report = run_transmit(&sender, &config, &StopFlag::new()).await;
        assert!(report.total_sent > 0);

        let mut buf = [0u8; 64];
        let outcome = sink
            .recv_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(
            outcome,
            RecvOutcome::Datagram {
                len: 8,
                from: sender.local_addr()
            }
        );
        assert_eq!(&buf[..8], b"cccccccc");
    }
}
