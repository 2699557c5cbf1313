//! # linkprobe
//!
//! Packet loss and latency measurement for a wireless link, using a wired
//! network as the return path.
//!
//! A mobile node sends sequence-numbered, timestamped UDP probes over Wi-Fi.
//! A fixed node logs every probe it receives and reflects it over Ethernet.
//! The mobile node matches reflections against what it sent and reports loss
//! and per-packet latency.
//!
//! ## Architecture
//!
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     CLI / Config / Report                       │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 Sessions (mobile, fixed, blast)                 │
//! │  ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────┐         │
//! │  │ Transmit │  │ Receive  │  │ Reflect  │  │Aggregator│         │
//! │  └──────────┘  └──────────┘  └──────────┘  └──────────┘         │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                 Probe codec (padding + trailer)                 │
//! ├─────────────────────────────────────────────────────────────────┤
//! │            UDP transport (socket2, interface binding)           │
//! └─────────────────────────────────────────────────────────────────┘

#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::doc_markdown)]              // ASCII diagrams in docs
#![allow(clippy::cast_possible_truncation)]  // Packet ids wrap at u32
#![allow(clippy::cast_sign_loss)]
#![allow(clippy::cast_precision_loss)]       // Acceptable for stats
#![allow(clippy::cast_possible_wrap)]
#![allow(clippy::future_not_send)]
#![allow(clippy::option_if_let_else)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::ignored_unit_patterns)]

pub mod config;
pub mod error;
pub mod probe;
pub mod protocol;
pub mod report;
pub mod transport;
pub mod types;
pub mod util;

#[cfg(feature = "cli")]
pub mod cli;

pub use config::Config;
pub use error::{Error, Result};
pub use types::*;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default UDP port for every socket
pub const DEFAULT_PORT: u16 = 1234;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::config::Config;
    pub use crate::error::{Error, Result};
    pub use crate::probe::{
        BlastSession, BlastSettings, FixedSession, FixedSettings, MeasurementReport,
        MobileSession, MobileSettings, StopFlag, StopReason,
    };
    pub use crate::protocol::{decode, encode, ProbePacket};
    pub use crate::transport::{TransportConfig, UdpTransport};
    pub use crate::types::*;
}
