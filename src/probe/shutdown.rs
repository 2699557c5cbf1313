//! Shared stop flag for graceful shutdown.
//!
//! The flag is raised once, either by the session when the test deadline
//! passes or by Ctrl-C. Loops poll it every iteration; orchestrators can also
//! await it.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tracing::{debug, info, warn};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// The configured duration elapsed.
    Deadline,
    /// The operator interrupted the run.
    Interrupted,
}

/// Cloneable stop flag shared by every loop of a session.
#[derive(Debug, Clone)]
pub struct StopFlag {
    tx: Arc<watch::Sender<Option<StopReason>>>,
}

impl StopFlag {
    /// Create a new, unraised flag.
    pub fn new() -> Self {
        let (tx, _) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    /// Check if a stop was requested.
    pub fn is_stopped(&self) -> bool {
        self.tx.borrow().is_some()
    }

    /// The first reason the flag was raised with, if any.
    pub fn reason(&self) -> Option<StopReason> {
        *self.tx.borrow()
    }

    /// Raise the flag. Later calls keep the first reason.
    pub fn stop(&self, reason: StopReason) {
        let raised = self.tx.send_if_modified(|current| {
            if current.is_some() {
                return false;
            }
            *current = Some(reason);
            true
        });
        if raised {
            debug!("Stop requested: {:?}", reason);
        }
    }

    /// Wait until the flag is raised.
    pub async fn wait(&self) -> StopReason {
        let mut rx = self.tx.subscribe();
        // The sender lives in `self`, so the channel cannot close while we wait.
        let _ = rx.wait_for(Option::is_some).await;
        self.reason().unwrap_or(StopReason::Interrupted)
    }

    /// Raise the flag with [`StopReason::Interrupted`] on Ctrl-C.
    pub fn install_ctrl_c_handler(&self) {
        let flag = self.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    info!("Interrupt received, stopping test");
                    flag.stop(StopReason::Interrupted);
                }
                Err(e) => warn!("Failed to listen for Ctrl-C: {}", e),
            }
        });
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}
