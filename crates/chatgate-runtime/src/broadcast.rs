//! Batched broadcast delivery
//!
//! Fans one payload out to a recipient list in fixed-size batches. Sends
//! within a batch run concurrently; a fixed pause separates batches so the
//! outbound rate stays under provider flood limits. Every recipient gets an
//! explicit outcome, and one failure never stops the run.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use chatgate_core::{config::BroadcastConfig, IdentityId};

use crate::messaging::Messenger;

// ----------------------------------------------------------------------------
// Progress and Report
// ----------------------------------------------------------------------------

/// Running totals emitted after each completed batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastProgress {
    /// Recipients attempted so far
    pub processed: usize,
    /// Total recipients in this run
    pub total: usize,
    /// Successful deliveries so far
    pub success: usize,
    /// Failed deliveries so far
    pub failure: usize,
}

/// Final accounting of one broadcast run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BroadcastReport {
    pub total: usize,
    pub success: usize,
    pub failure: usize,
}

impl BroadcastReport {
    /// Delivery success as a percentage; 100 for an empty run
    pub fn success_rate(&self) -> f64 {
        if self.total == 0 {
            100.0
        } else {
            self.success as f64 * 100.0 / self.total as f64
        }
    }
}

// ----------------------------------------------------------------------------
// Broadcast Dispatcher
// ----------------------------------------------------------------------------

/// Delivers one payload to many identities in rate-shaped batches
pub struct BroadcastDispatcher {
    messenger: Arc<dyn Messenger>,
    batch_size: usize,
    batch_delay: Duration,
}

impl BroadcastDispatcher {
    pub fn new(messenger: Arc<dyn Messenger>, config: &BroadcastConfig) -> Self {
        Self {
            messenger,
            batch_size: config.batch_size.max(1),
            batch_delay: config.batch_delay(),
        }
    }

    /// Send `payload` to every recipient. Runs to completion once started;
    /// per-recipient failures are logged and counted, never propagated.
    /// Progress totals are reported after each batch when a sender is given.
    pub async fn broadcast(
        &self,
        recipients: &[IdentityId],
        payload: &str,
        progress: Option<mpsc::UnboundedSender<BroadcastProgress>>,
    ) -> BroadcastReport {
        let total = recipients.len();
        let mut success = 0usize;
        let mut failure = 0usize;
        let mut processed = 0usize;

        info!(total, batch_size = self.batch_size, "broadcast started");

        let batches = recipients.chunks(self.batch_size);
        let last_index = batches.len().saturating_sub(1);
        for (index, batch) in recipients.chunks(self.batch_size).enumerate() {
            let sends = batch
                .iter()
                .map(|&identity| async move {
                    (identity, self.messenger.send(identity, payload).await)
                });
            for (identity, outcome) in futures::future::join_all(sends).await {
                processed += 1;
                match outcome {
                    Ok(()) => success += 1,
                    Err(err) => {
                        failure += 1;
                        warn!(%identity, %err, "broadcast delivery failed");
                    }
                }
            }

            if let Some(tx) = &progress {
                let _ = tx.send(BroadcastProgress {
                    processed,
                    total,
                    success,
                    failure,
                });
            }
            debug!(processed, total, "broadcast batch complete");

            // No pause after the final batch
            if index < last_index && !self.batch_delay.is_zero() {
                tokio::time::sleep(self.batch_delay).await;
            }
        }

        let report = BroadcastReport {
            total,
            success,
            failure,
        };
        info!(
            total,
            success,
            failure,
            rate = report.success_rate(),
            "broadcast complete"
        );
        report
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
