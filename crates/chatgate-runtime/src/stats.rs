//! Periodic statistics job
//!
//! Once a day, at a fixed local wall-clock time, recounts the identities
//! active over the trailing window and sweeps the caches and rate-limiter
//! windows. Runs as one background task with an explicit shutdown command,
//! so the runtime can stop it deterministically.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use chatgate_core::{config::StatsConfig, Timestamp};

use crate::cache_manager::CacheManager;
use crate::store::StateStore;

const SECS_PER_DAY: i64 = 86_400;
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

// ----------------------------------------------------------------------------
// Scheduling
// ----------------------------------------------------------------------------

/// Time until the next daily recompute at the configured local wall-clock
/// time. If today's slot has already passed, the next one is tomorrow's.
fn next_recompute_delay(now_unix_secs: i64, config: &StatsConfig) -> Duration {
    let local = now_unix_secs + i64::from(config.utc_offset_secs);
    let into_day = local.rem_euclid(SECS_PER_DAY);
    let target = i64::from(config.recompute_hour) * 3_600 + i64::from(config.recompute_minute) * 60;
    let mut delta = target - into_day;
    if delta <= 0 {
        delta += SECS_PER_DAY;
    }
    Duration::from_secs(delta as u64)
}

// ----------------------------------------------------------------------------
// Stats Task
// ----------------------------------------------------------------------------

#[derive(Debug)]
enum StatsCommand {
    /// Run one cycle immediately instead of waiting for the schedule
    RecomputeNow,
    Shutdown,
}

/// Handle to the running daily-stats background task
pub struct StatsTask {
    tx: mpsc::UnboundedSender<StatsCommand>,
    handle: JoinHandle<()>,
}

impl StatsTask {
    /// Spawn the task; it idles until the next scheduled slot
    pub fn spawn(config: StatsConfig, store: Arc<StateStore>, cache: Arc<CacheManager>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run(config, store, cache, rx));
        Self { tx, handle }
    }

    /// Request an immediate off-schedule cycle
    pub fn trigger(&self) {
        let _ = self.tx.send(StatsCommand::RecomputeNow);
    }

    /// Stop the task, aborting it if it exceeds the grace period
    pub async fn shutdown(self) {
        let _ = self.tx.send(StatsCommand::Shutdown);
        let abort = self.handle.abort_handle();
        if tokio::time::timeout(SHUTDOWN_GRACE, self.handle)
            .await
            .is_err()
        {
            warn!("stats task did not stop in time, aborting");
            abort.abort();
        }
    }
}

async fn run(
    config: StatsConfig,
    store: Arc<StateStore>,
    cache: Arc<CacheManager>,
    mut rx: mpsc::UnboundedReceiver<StatsCommand>,
) {
    info!(
        hour = config.recompute_hour,
        minute = config.recompute_minute,
        "stats task started"
    );
    loop {
        let delay = next_recompute_delay(Timestamp::now().as_secs() as i64, &config);
        tokio::select! {
            command = rx.recv() => match command {
                Some(StatsCommand::RecomputeNow) => run_cycle(&store, &cache),
                Some(StatsCommand::Shutdown) | None => break,
            },
            _ = tokio::time::sleep(delay) => run_cycle(&store, &cache),
        }
    }
    info!("stats task stopped");
}

fn run_cycle(store: &StateStore, cache: &CacheManager) {
    let active = store.recompute_active_window(Timestamp::now());
    cache.sweep();
    info!(active, "daily stats cycle complete");
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use chatgate_core::{ChatgateConfig, IdentityId, StoreConfig};

    fn ist() -> StatsConfig {
        StatsConfig::default() // 05:30 at UTC+5:30, i.e. 00:00 UTC
    }

    #[test]
    fn test_delay_before_slot_lands_on_it() {
        // 2024-01-01 23:00 UTC, one hour before the 00:00 UTC slot
        let now = 1_704_150_000;
        assert_eq!(next_recompute_delay(now, &ist()), Duration::from_secs(3_600));
    }

    #[test]
    fn test_delay_after_slot_rolls_to_next_day() {
        // One second past the slot waits a full day minus that second
        let at_slot = 1_704_153_600;
        assert_eq!(
            next_recompute_delay(at_slot + 1, &ist()),
            Duration::from_secs(86_399)
        );
        // Exactly at the slot also schedules the next day, never zero
        assert_eq!(
            next_recompute_delay(at_slot, &ist()),
            Duration::from_secs(86_400)
        );
    }

    #[test]
    fn test_negative_offset_is_handled() {
        let config = StatsConfig {
            recompute_hour: 0,
            recompute_minute: 0,
            utc_offset_secs: -3_600, // UTC-1
        };
        // 2024-01-01 22:00 UTC is 21:00 local; midnight local is 3h away
        let now = 1_704_146_400;
        assert_eq!(
            next_recompute_delay(now, &config),
            Duration::from_secs(3 * 3_600)
        );
    }

    #[tokio::test]
    async fn test_triggered_cycle_recomputes_and_stops_cleanly() {
        let config = ChatgateConfig::default();
        let storage = Arc::new(MemoryStorage::new());
        let (store, _writer) = StateStore::load(StoreConfig::default(), storage)
            .await
            .unwrap();
        let cache = Arc::new(CacheManager::new(
            &config.cache,
            &config.rate_limit,
            &config.gate,
        ));
        store.record_interaction(IdentityId::new(1));

        let task = StatsTask::spawn(config.stats, Arc::clone(&store), cache);
        task.trigger();
        // Give the task a chance to process the command
        tokio::time::sleep(Duration::from_millis(20)).await;
        task.shutdown().await;

        let stats = store.get_stats();
        assert_eq!(stats.active_24h, 1);
        assert!(stats.last_update.is_some());
    }
}
