//! Global concurrency gate
//!
//! Bounds how many handler executions are in flight at once, decoupling the
//! inbound request rate from external-call concurrency and memory use.
//! Excess callers suspend until a slot frees; backpressure is delay, never
//! rejection. The permit is RAII, so the slot is released on every exit
//! path of the guarded section.

use std::sync::Arc;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use chatgate_core::{config::GateConfig, ChatgateError, Result};

// ----------------------------------------------------------------------------
// Concurrency Gate
// ----------------------------------------------------------------------------

/// Counting admission gate with a fixed capacity
#[derive(Debug, Clone)]
pub struct ConcurrencyGate {
    semaphore: Arc<Semaphore>,
    capacity: usize,
}

/// A held slot in the gate; dropping it releases the slot
#[derive(Debug)]
pub struct GatePermit {
    _permit: OwnedSemaphorePermit,
}

impl ConcurrencyGate {
    /// Create a gate admitting at most `max_concurrent` holders
    pub fn new(config: &GateConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.max_concurrent)),
            capacity: config.max_concurrent,
        }
    }

    /// Acquire a slot, suspending until one is free
    pub async fn acquire(&self) -> Result<GatePermit> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| ChatgateError::GateClosed)?;
        Ok(GatePermit { _permit: permit })
    }

    /// Slots currently free
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Configured capacity
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_gate_bounds_concurrent_holders() {
        let gate = ConcurrencyGate::new(&GateConfig { max_concurrent: 2 });

        let first = gate.acquire().await.unwrap();
        let _second = gate.acquire().await.unwrap();
        assert_eq!(gate.available(), 0);

        // Third acquire must suspend while the gate is full
        let blocked = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(blocked.is_err());

        drop(first);
        let third = tokio::time::timeout(Duration::from_millis(50), gate.acquire()).await;
        assert!(third.is_ok());
    }

    #[tokio::test]
    async fn test_permit_released_on_early_exit() {
        let gate = ConcurrencyGate::new(&GateConfig { max_concurrent: 1 });

        async fn guarded(gate: &ConcurrencyGate, fail: bool) -> Result<()> {
            let _permit = gate.acquire().await?;
            if fail {
                return Err(ChatgateError::storage_error("boom"));
            }
            Ok(())
        }

        assert!(guarded(&gate, true).await.is_err());
        // The slot came back even though the guarded section errored
        assert_eq!(gate.available(), 1);
        assert!(guarded(&gate, false).await.is_ok());
    }
}
