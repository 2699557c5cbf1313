//! End-to-end tests over the loopback interface.
//!
//! Both roles run in one process: the "Wi-Fi" and "Ethernet" paths are just
//! separate loopback sockets. Covers:
//! 1. Lossless mobile/fixed round trips
//! 2. Loss accounting with a reflector that drops selected ids
//! 3. Source filtering and malformed datagrams
//! 4. Reception log streaming
//! 5. Interruption and setup failures

use std::collections::HashSet;
use std::net::{SocketAddr, UdpSocket as StdUdpSocket};
use std::path::PathBuf;
use std::time::Duration;

use tokio::net::UdpSocket;
use tokio::time::Instant;

use linkprobe::error::{Error, TransportError};
use linkprobe::probe::{
    run_receiver, run_reflector, BlastSession, BlastSettings, FixedSession, FixedSettings,
    MobileSession, MobileSettings, ReceiverConfig, ReflectorConfig, StopFlag, StopReason,
};
use linkprobe::protocol;
use linkprobe::transport::{RecvOutcome, SocketConfig, TransportConfig, UdpTransport};

// ============================================================================
// Helpers
// ============================================================================

fn any_local() -> SocketAddr {
    "127.0.0.1:0".parse().unwrap()
}

fn bind_local() -> UdpTransport {
    UdpTransport::bind(any_local(), &SocketConfig::default()).unwrap()
}

/// Reserve a free loopback port and release it again.
fn free_port() -> u16 {
    let socket = StdUdpSocket::bind(any_local()).unwrap();
    socket.local_addr().unwrap().port()
}

fn mobile_settings(destination: SocketAddr, ethernet_bind: SocketAddr) -> MobileSettings {
    MobileSettings {
        wifi_bind: any_local(),
        ethernet_bind,
        wifi_interface: None,
        ethernet_interface: None,
        destination,
        reflector: "127.0.0.1".parse().unwrap(),
        packet_size: 64,
        interval: Duration::from_millis(1),
        duration: Duration::from_millis(100),
        count: None,
        linger: Duration::from_millis(300),
    }
}

fn fixed_settings(return_addr: SocketAddr, reception_log: Option<PathBuf>) -> FixedSettings {
    FixedSettings {
        wifi_bind: any_local(),
        ethernet_bind: any_local(),
        wifi_interface: None,
        ethernet_interface: None,
        return_addr,
        interval: Duration::from_millis(1),
        duration: Duration::from_secs(30),
        reception_log,
    }
}

/// Reflector that echoes every probe except those `skip` selects.
async fn lossy_reflector(socket: UdpSocket, return_addr: SocketAddr, skip: fn(u32) -> bool) {
    let mut buf = vec![0u8; protocol::RECV_BUFFER_SIZE];
    while let Ok((len, _)) = socket.recv_from(&mut buf).await {
        let Some((id, _)) = protocol::decode(&buf[..len]) else {
            continue;
        };
        if !skip(id) {
            let _ = socket.send_to(&buf[..len], return_addr).await;
        }
    }
}

// ============================================================================
// Round-trip tests
// ============================================================================

#[tokio::test]
async fn test_mobile_fixed_round_trip_is_lossless() {
    let transport = TransportConfig::default();
    let mobile_eth: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();

    let fixed = FixedSession::bind(fixed_settings(mobile_eth, None), &transport).unwrap();

    let mobile =
        MobileSession::bind(mobile_settings(fixed.wifi_addr(), mobile_eth), &transport).unwrap();
    assert_eq!(mobile.ethernet_addr(), mobile_eth);

    let fixed_stop = StopFlag::new();
    let fixed_task = tokio::spawn(fixed.run(fixed_stop.clone()));

    let report = mobile.run(StopFlag::new()).await.unwrap();

    fixed_stop.stop(StopReason::Interrupted);
    let fixed_report = fixed_task.await.unwrap().unwrap();

    let m = &report.measurement;
    assert!(m.total_sent > 0);
    assert_eq!(m.total_sent, report.transmit.total_sent);
    assert_eq!(m.total_received, m.total_sent);
    assert_eq!(m.packet_loss_pct, 0.0);
    assert_eq!(m.samples.len() as u64, m.total_sent);
    assert!(m.samples.iter().all(|s| s.latency_ms >= 0.0));
    assert_eq!(report.latency, m.latency_stats());
    assert_eq!(report.stop_reason, StopReason::Deadline);

    let r = &fixed_report.reflector;
    assert_eq!(r.packets_received, m.total_sent);
    assert_eq!(r.reflected, m.total_sent);
    assert_eq!(r.bytes_received, m.total_sent * 64);
    assert!(r.records.iter().all(|rec| rec.decoded && rec.length_bytes == 64));

    let ids: HashSet<u32> = r.records.iter().map(|rec| rec.packet_id).collect();
    assert_eq!(ids.len() as u64, m.total_sent);
    assert_eq!(fixed_report.stop_reason, StopReason::Interrupted);
}

#[tokio::test]
async fn test_hundred_packets_all_come_back() {
    let transport = TransportConfig::default();
    let mobile_eth: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();

    let fixed = FixedSession::bind(fixed_settings(mobile_eth, None), &transport).unwrap();
    let settings = MobileSettings {
        duration: Duration::from_secs(10),
        count: Some(100),
        ..mobile_settings(fixed.wifi_addr(), mobile_eth)
    };
    let mobile = MobileSession::bind(settings, &transport).unwrap();

    let fixed_stop = StopFlag::new();
    let fixed_task = tokio::spawn(fixed.run(fixed_stop.clone()));

    let started = Instant::now();
    let report = mobile.run(StopFlag::new()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));

    fixed_stop.stop(StopReason::Interrupted);
    let fixed_report = fixed_task.await.unwrap().unwrap();

    let m = &report.measurement;
    assert_eq!(m.total_sent, 100);
    assert_eq!(m.total_received, 100);
    assert_eq!(m.packet_loss_pct, 0.0);
    assert_eq!(m.samples.len(), 100);

    let latency = report.latency.expect("latency summary");
    assert!(latency.min_ms <= latency.avg_ms && latency.avg_ms <= latency.max_ms);
    assert!(latency.p95_ms <= latency.p99_ms);

    assert_eq!(fixed_report.reflector.packets_received, 100);
    assert_eq!(fixed_report.reflector.bytes_received, 100 * 64);
}

#[tokio::test]
async fn test_dropped_reflections_count_as_loss() {
    let transport = TransportConfig::default();
    let mobile_eth: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();

    let reflector = UdpSocket::bind(any_local()).await.unwrap();
    let reflector_addr = reflector.local_addr().unwrap();
    let drop_every_tenth = |id: u32| id % 10 == 3;
    let reflector_task = tokio::spawn(lossy_reflector(reflector, mobile_eth, drop_every_tenth));

    let settings = MobileSettings {
        duration: Duration::from_millis(150),
        ..mobile_settings(reflector_addr, mobile_eth)
    };
    let report = MobileSession::bind(settings, &transport)
        .unwrap()
        .run(StopFlag::new())
        .await
        .unwrap();
    reflector_task.abort();

    let m = &report.measurement;
    let dropped = (0..m.total_sent as u32).filter(|id| drop_every_tenth(*id)).count() as u64;
    assert!(dropped > 0);
    assert_eq!(m.total_received, m.total_sent - dropped);

    let expected = dropped as f64 / m.total_sent as f64 * 100.0;
    assert!((m.packet_loss_pct - expected).abs() < 1e-9);
    assert!(m.samples.iter().all(|s| !drop_every_tenth(s.packet_id)));
}

#[tokio::test]
async fn test_stop_request_ends_session_early() {
    let transport = TransportConfig::default();
    let settings = MobileSettings {
        duration: Duration::from_secs(60),
        linger: Duration::ZERO,
        // Nobody listens here; nothing comes back.
        ..mobile_settings(format!("127.0.0.1:{}", free_port()).parse().unwrap(), any_local())
    };
    let session = MobileSession::bind(settings, &transport).unwrap();

    let stop = StopFlag::new();
    let task = tokio::spawn(session.run(stop.clone()));

    tokio::time::sleep(Duration::from_millis(100)).await;
    let stopped_at = Instant::now();
    stop.stop(StopReason::Interrupted);

    let report = tokio::time::timeout(Duration::from_secs(2), task)
        .await
        .expect("session did not stop in time")
        .unwrap()
        .unwrap();

    // Poll timeout is interval + 100ms margin.
    assert!(stopped_at.elapsed() < Duration::from_secs(1));
    assert_eq!(report.stop_reason, StopReason::Interrupted);
    assert!(report.measurement.total_sent > 0);
    assert_eq!(report.measurement.total_received, 0);
    assert_eq!(report.measurement.packet_loss_pct, 100.0);
}

#[tokio::test]
async fn test_nothing_sent_reports_zero_loss() {
    let transport = TransportConfig::default();
    let session = MobileSession::bind(
        mobile_settings("127.0.0.1:9".parse().unwrap(), any_local()),
        &transport,
    )
    .unwrap();

    let stop = StopFlag::new();
    stop.stop(StopReason::Interrupted);
    let report = session.run(stop).await.unwrap();

    assert_eq!(report.measurement.total_sent, 0);
    assert_eq!(report.measurement.total_received, 0);
    assert_eq!(report.measurement.packet_loss_pct, 0.0);
    assert!(report.measurement.samples.is_empty());
}

// ============================================================================
// Receive and reflect loops
// ============================================================================

#[cfg(target_os = "linux")]
#[tokio::test]
async fn test_receiver_ignores_foreign_sources() {
    let receiver = bind_local();
    let receiver_addr = receiver.local_addr();
    let stop = StopFlag::new();

    let task = tokio::spawn(run_receiver(
        receiver,
        ReceiverConfig {
            expected_source: "127.0.0.1".parse().unwrap(),
            poll_timeout: Duration::from_millis(50),
        },
        stop.clone(),
    ));

    let foreign = UdpSocket::bind("127.0.0.2:0").await.unwrap();
    foreign
        .send_to(&protocol::encode(1, protocol::now_micros(), 32), receiver_addr)
        .await
        .unwrap();

    let trusted = UdpSocket::bind(any_local()).await.unwrap();
    trusted
        .send_to(&protocol::encode(2, protocol::now_micros(), 32), receiver_addr)
        .await
        .unwrap();
    trusted.send_to(&[0u8; 4], receiver_addr).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.stop(StopReason::Deadline);
    let (aggregator, stats) = task.await.unwrap();

    assert_eq!(aggregator.total_received(), 1);
    assert!(aggregator.contains(2));
    assert!(!aggregator.contains(1));
    assert_eq!(stats.datagrams, 3);
    assert_eq!(stats.foreign, 1);
    assert_eq!(stats.malformed, 1);
}

#[tokio::test]
async fn test_duplicate_reflections_count_once() {
    let receiver = bind_local();
    let receiver_addr = receiver.local_addr();
    let stop = StopFlag::new();

    let task = tokio::spawn(run_receiver(
        receiver,
        ReceiverConfig {
            expected_source: "127.0.0.1".parse().unwrap(),
            poll_timeout: Duration::from_millis(50),
        },
        stop.clone(),
    ));

    let sender = UdpSocket::bind(any_local()).await.unwrap();
    let probe = protocol::encode(5, protocol::now_micros(), 16);
    sender.send_to(&probe, receiver_addr).await.unwrap();
    sender.send_to(&probe, receiver_addr).await.unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    stop.stop(StopReason::Deadline);
    let (aggregator, stats) = task.await.unwrap();

    let report = aggregator.finish(1);
    assert_eq!(report.total_received, 1);
    assert_eq!(report.samples.len(), 2);
    assert_eq!(report.packet_loss_pct, 0.0);
    assert_eq!(stats.duplicates, 1);
}

#[tokio::test]
async fn test_reflector_logs_and_echoes_unmodified() {
    let inbound = bind_local();
    let outbound = bind_local();
    let inbound_addr = inbound.local_addr();
    let outbound_addr = outbound.local_addr();
    let sink = bind_local();
    let stop = StopFlag::new();

    let task = tokio::spawn(run_reflector(
        inbound,
        outbound,
        ReflectorConfig {
            return_addr: sink.local_addr(),
            poll_timeout: Duration::from_millis(50),
        },
        stop.clone(),
        Instant::now(),
        None,
    ));

    let sender = UdpSocket::bind(any_local()).await.unwrap();
    let short = [9u8, 8, 7, 6, 5];
    let probe = protocol::encode(77, 123_456, 40);
    sender.send_to(&short, inbound_addr).await.unwrap();
    tokio::time::sleep(Duration::from_millis(20)).await;
    sender.send_to(&probe, inbound_addr).await.unwrap();

    let mut buf = [0u8; 128];
    for expected in [&short[..], &probe[..]] {
        let outcome = sink
            .recv_timeout(&mut buf, Duration::from_secs(1))
            .await
            .unwrap();
        let RecvOutcome::Datagram { len, from } = outcome else {
            panic!("reflection missing");
        };
        assert_eq!(from, outbound_addr);
        assert_eq!(&buf[..len], expected);
    }

    stop.stop(StopReason::Deadline);
    let report = task.await.unwrap();

    assert_eq!(report.packets_received, 2);
    assert_eq!(report.reflected, 2);
    assert_eq!(report.undecoded, 1);
    assert_eq!(report.records[0].packet_id, 1);
    assert!(!report.records[0].decoded);
    assert_eq!(report.records[0].length_bytes, 5);
    assert_eq!(report.records[1].packet_id, 77);
    assert_eq!(report.records[1].length_bytes, 40);
    assert!(report.records[0].relative_time <= report.records[1].relative_time);
}

// ============================================================================
// Reception log
// ============================================================================

#[tokio::test]
async fn test_fixed_session_streams_reception_log() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("out").join("reception_log.csv");
    let transport = TransportConfig::default();
    let mobile_eth: SocketAddr = format!("127.0.0.1:{}", free_port()).parse().unwrap();

    let fixed =
        FixedSession::bind(fixed_settings(mobile_eth, Some(path.clone())), &transport).unwrap();
    // Header is on disk before anything arrives.
    let header = std::fs::read_to_string(&path).unwrap();
    assert!(header.starts_with("Packet ID,"));

    let settings = MobileSettings {
        count: Some(40),
        duration: Duration::from_secs(10),
        ..mobile_settings(fixed.wifi_addr(), mobile_eth)
    };
    let mobile = MobileSession::bind(settings, &transport).unwrap();

    let fixed_stop = StopFlag::new();
    let fixed_task = tokio::spawn(fixed.run(fixed_stop.clone()));
    let report = mobile.run(StopFlag::new()).await.unwrap();
    fixed_stop.stop(StopReason::Interrupted);
    let fixed_report = fixed_task.await.unwrap().unwrap();

    let r = &fixed_report.reflector;
    assert_eq!(report.measurement.total_sent, 40);
    assert_eq!(r.packets_received, 40);
    assert_eq!(r.logged, 40);
    assert_eq!(r.log_errors, 0);
    assert!(r.records.is_empty());

    let contents = std::fs::read_to_string(&path).unwrap();
    let rows: Vec<&str> = contents.lines().skip(1).collect();
    assert_eq!(rows.len(), 40);
    let ids: HashSet<&str> = rows
        .iter()
        .map(|row| row.split(',').next().unwrap())
        .collect();
    assert_eq!(ids.len(), 40);
    assert!(rows.iter().all(|row| row.split(',').nth(1) == Some("64")));
}

#[tokio::test]
async fn test_unwritable_reception_log_fails_bind() {
    let dir = tempfile::tempdir().unwrap();
    let blocker = dir.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").unwrap();

    let settings = fixed_settings(
        "127.0.0.1:9".parse().unwrap(),
        Some(blocker.join("reception_log.csv")),
    );
    let result = FixedSession::bind(settings, &TransportConfig::default());
    assert!(matches!(result, Err(Error::Config(_))));
}

// ============================================================================
// Blast and setup failures
// ============================================================================

#[tokio::test]
async fn test_blast_sends_filler() {
    let sink = bind_local();
    let session = BlastSession::bind(
        BlastSettings {
            destination: sink.local_addr(),
            interface: None,
            packet_size: 100,
            interval: Duration::from_millis(2),
            duration: Duration::from_millis(50),
        },
        &TransportConfig::default(),
    )
    .unwrap();

    let report = session.run(StopFlag::new()).await.unwrap();
    assert!(report.transmit.total_sent > 0);
    assert_eq!(report.transmit.bytes_sent, report.transmit.total_sent * 100);
    assert!(report.throughput.bytes_per_sec > 0.0);

    let mut buf = [0u8; 256];
    let outcome = sink
        .recv_timeout(&mut buf, Duration::from_secs(1))
        .await
        .unwrap();
    let RecvOutcome::Datagram { len, .. } = outcome else {
        panic!("no filler packet");
    };
    assert_eq!(len, 100);
    assert!(buf[..len].iter().all(|&b| b == b'c'));
}

#[tokio::test]
async fn test_port_in_use_is_setup_error() {
    let taken = bind_local();
    let settings = MobileSettings {
        wifi_bind: taken.local_addr(),
        ..mobile_settings("127.0.0.1:9".parse().unwrap(), any_local())
    };

    let result = MobileSession::bind(settings, &TransportConfig::default());
    assert!(matches!(
        result,
        Err(Error::Transport(TransportError::BindFailed { .. }))
    ));
}

#[tokio::test]
async fn test_small_packets_rejected_before_bind() {
    let settings = MobileSettings {
        packet_size: 11,
        ..mobile_settings("127.0.0.1:9".parse().unwrap(), any_local())
    };
    assert!(MobileSession::bind(settings, &TransportConfig::default()).is_err());
}
