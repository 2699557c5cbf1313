//! The measurement engine.
//!
//! Per node, the transmit loop and the receive/reflect loop run as separate
//! tokio tasks. They share nothing mutable but the [`StopFlag`]: the mobile
//! receive task owns its [`Aggregator`] outright and returns it when joined.
//!
//! ```text
//!   mobile                          fixed
//!   ┌──────────────┐   Wi-Fi     ┌───────────────┐
//!   │ transmit     │ ──────────▶ │ reflect       │
//!   │              │             │  log + echo   │
//!   │ receive      │ ◀────────── │               │
//!   │  aggregator  │  Ethernet   └───────────────┘
//!   └──────────────┘
//! ```

mod aggregator;
mod receive;
mod reflect;
mod session;
mod shutdown;
mod transmit;

pub use aggregator::{loss_percentage, Aggregator, MeasurementReport};
pub use receive::{classify, run_receiver, DiscardReason, ReceiverConfig, ReceiverStats, Verdict};
pub use reflect::{reception_record, run_reflector, ReflectorConfig, ReflectorReport};
pub use session::{
    BlastReport, BlastSession, BlastSettings, FixedReport, FixedSession, FixedSettings,
    MobileReport, MobileSession, MobileSettings,
};
pub use shutdown::{StopFlag, StopReason};
pub use transmit::{run_transmit, PayloadKind, TransmitConfig, TransmitReport};

use std::time::Duration;

/// Pause before retrying a receive after back-to-back errors.
pub(crate) const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(10);
