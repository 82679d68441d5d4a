//! Runtime assembly
//!
//! Wires the store, caches, membership checker, broadcast dispatcher, and
//! background tasks into one handle with an explicit lifecycle: `start`
//! loads state and spawns the tasks, `shutdown` stops them with a bounded
//! grace period. Nothing here is global; every service lives inside the
//! handle and tests construct as many runtimes as they need.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use chatgate_core::{
    AggregateStats, ChannelGate, ChannelId, ChatgateConfig, IdentityId, IdentityRecord,
    MembershipOutcome, Result,
};

use crate::broadcast::{BroadcastDispatcher, BroadcastProgress, BroadcastReport};
use crate::cache_manager::CacheManager;
use crate::gate::GatePermit;
use crate::membership::MembershipChecker;
use crate::messaging::Messenger;
use crate::stats::StatsTask;
use crate::storage::BlobStorage;
use crate::store::StateStore;

const WRITER_SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

// ----------------------------------------------------------------------------
// Runtime
// ----------------------------------------------------------------------------

/// The assembled chat-gate state layer
pub struct ChatgateRuntime {
    config: ChatgateConfig,
    store: Arc<StateStore>,
    cache: Arc<CacheManager>,
    membership: MembershipChecker,
    dispatcher: BroadcastDispatcher,
    stats_task: StatsTask,
    writer_handle: JoinHandle<()>,
}

impl ChatgateRuntime {
    /// Load persisted state and spawn the persistence writer and the daily
    /// stats task
    pub async fn start(
        config: ChatgateConfig,
        storage: Arc<dyn BlobStorage>,
        messenger: Arc<dyn Messenger>,
    ) -> Result<Self> {
        let (store, writer) = StateStore::load(config.store.clone(), storage).await?;
        let writer_handle = tokio::spawn(writer.run());

        let cache = Arc::new(CacheManager::new(
            &config.cache,
            &config.rate_limit,
            &config.gate,
        ));
        let membership = MembershipChecker::new(
            Arc::clone(&store),
            Arc::clone(&cache),
            Arc::clone(&messenger),
        );
        let dispatcher = BroadcastDispatcher::new(Arc::clone(&messenger), &config.broadcast);
        let stats_task = StatsTask::spawn(
            config.stats.clone(),
            Arc::clone(&store),
            Arc::clone(&cache),
        );

        info!("chatgate runtime started");
        Ok(Self {
            config,
            store,
            cache,
            membership,
            dispatcher,
            stats_task,
            writer_handle,
        })
    }

    /// Stop the background tasks. The writer drains everything queued
    /// before the shutdown command; past the grace period it is aborted.
    pub async fn shutdown(self) {
        self.stats_task.shutdown().await;
        self.store.shutdown_writer();
        let abort = self.writer_handle.abort_handle();
        if tokio::time::timeout(WRITER_SHUTDOWN_GRACE, self.writer_handle)
            .await
            .is_err()
        {
            warn!("persistence writer did not drain in time, aborting");
            abort.abort();
        }
        info!("chatgate runtime stopped");
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Acquire a slot in the global concurrency gate
    pub async fn acquire(&self) -> Result<GatePermit> {
        self.cache.acquire().await
    }

    /// Sliding-window rate check for one identity
    pub fn check_rate_limit(&self, identity: IdentityId) -> bool {
        self.cache.check_rate_limit(identity)
    }

    /// Whether `identity` is on the static admin allow-list
    pub fn is_admin(&self, identity: IdentityId) -> bool {
        self.config.is_admin(identity)
    }

    // ------------------------------------------------------------------
    // Identities
    // ------------------------------------------------------------------

    /// Register an interaction and refresh the cached snapshot
    pub fn record_interaction(&self, identity: IdentityId) -> IdentityRecord {
        let record = self.store.record_interaction(identity);
        self.cache.set_identity(identity, record.clone());
        record
    }

    /// Identity record, from cache when fresh, else from the store
    pub fn identity(&self, identity: IdentityId) -> Option<IdentityRecord> {
        if let Some(record) = self.cache.get_identity(identity) {
            return Some(record);
        }
        let record = self.store.get_identity(identity)?;
        self.cache.set_identity(identity, record.clone());
        Some(record)
    }

    /// Aggregate statistics; the total is live, the active count is as of
    /// the last daily recompute
    pub fn stats(&self) -> AggregateStats {
        self.store.get_stats()
    }

    // ------------------------------------------------------------------
    // Channel gates
    // ------------------------------------------------------------------

    /// Whether `identity` has joined every gated channel
    pub async fn check_membership(&self, identity: IdentityId) -> MembershipOutcome {
        self.membership.check(identity).await
    }

    /// Registered identities currently joined to `channel`
    pub async fn channel_join_count(&self, channel: ChannelId) -> u64 {
        self.membership.channel_join_count(channel).await
    }

    /// Current gate list
    pub fn list_channel_gates(&self) -> Vec<ChannelGate> {
        self.store.list_channel_gates()
    }

    /// Add a gate; every cached membership outcome is invalidated so the
    /// new gate is enforced on the next check
    pub fn add_channel_gate(&self, gate: ChannelGate) -> bool {
        let added = self.store.add_channel_gate(gate);
        if added {
            self.cache.clear_memberships();
        }
        added
    }

    /// Remove a gate, invalidating cached outcomes on success
    pub fn remove_channel_gate(&self, channel: ChannelId) -> bool {
        let removed = self.store.remove_channel_gate(channel);
        if removed {
            self.cache.clear_memberships();
        }
        removed
    }

    /// Remove every gate, invalidating all cached outcomes
    pub fn clear_channel_gates(&self) -> usize {
        let removed = self.store.clear_channel_gates();
        self.cache.clear_memberships();
        removed
    }

    // ------------------------------------------------------------------
    // Broadcast
    // ------------------------------------------------------------------

    /// Broadcast `payload` to every registered identity
    pub async fn broadcast(
        &self,
        payload: &str,
        progress: Option<mpsc::UnboundedSender<BroadcastProgress>>,
    ) -> BroadcastReport {
        let recipients = self.store.identity_ids();
        self.dispatcher.broadcast(&recipients, payload, progress).await
    }

    /// Run a stats cycle now instead of waiting for the daily slot
    pub fn trigger_stats(&self) {
        self.stats_task.trigger();
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::{MembershipStatus, MockMessenger};
    use crate::storage::MemoryStorage;
    use chatgate_core::Timestamp;

    fn gate(id: i64, title: &str) -> ChannelGate {
        ChannelGate {
            id: ChannelId::new(id),
            title: title.into(),
            handle: Some(format!("@{title}")),
            invite_ref: format!("https://t.me/{title}"),
            added_by: IdentityId::new(1),
            added_date: Timestamp::now(),
        }
    }

    async fn runtime_with(
        storage: Arc<MemoryStorage>,
        messenger: Arc<MockMessenger>,
    ) -> ChatgateRuntime {
        let config = ChatgateConfig {
            admins: vec![IdentityId::new(1)],
            ..Default::default()
        };
        ChatgateRuntime::start(config, storage, messenger)
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_admin_and_rate_limit_facade() {
        let runtime = runtime_with(
            Arc::new(MemoryStorage::new()),
            Arc::new(MockMessenger::new()),
        )
        .await;

        assert!(runtime.is_admin(IdentityId::new(1)));
        assert!(!runtime.is_admin(IdentityId::new(2)));
        assert!(runtime.check_rate_limit(IdentityId::new(2)));

        let permit = runtime.acquire().await.unwrap();
        drop(permit);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_record_interaction_refreshes_cache() {
        let runtime = runtime_with(
            Arc::new(MemoryStorage::new()),
            Arc::new(MockMessenger::new()),
        )
        .await;
        let identity = IdentityId::new(5);

        assert!(runtime.identity(identity).is_none());
        runtime.record_interaction(identity);
        runtime.record_interaction(identity);

        let record = runtime.identity(identity).unwrap();
        assert_eq!(record.total_interactions, 2);
        assert_eq!(runtime.stats().total_identities, 1);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_gate_change_invalidates_membership_outcomes() {
        let messenger = Arc::new(MockMessenger::new());
        let runtime =
            runtime_with(Arc::new(MemoryStorage::new()), Arc::clone(&messenger)).await;
        let identity = IdentityId::new(5);

        // No gates: satisfied, and the outcome is cached
        assert!(runtime.check_membership(identity).await.joined_all);

        // Adding a gate must drop that cached outcome immediately
        assert!(runtime.add_channel_gate(gate(-1, "updates")));
        assert!(!runtime.check_membership(identity).await.joined_all);

        messenger.set_membership(ChannelId::new(-1), identity, MembershipStatus::Member);
        assert!(runtime.remove_channel_gate(ChannelId::new(-1)));
        assert!(runtime.check_membership(identity).await.joined_all);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_broadcast_reaches_registered_identities() {
        let messenger = Arc::new(MockMessenger::new());
        let runtime =
            runtime_with(Arc::new(MemoryStorage::new()), Arc::clone(&messenger)).await;
        for id in 1..=5 {
            runtime.record_interaction(IdentityId::new(id));
        }

        let report = runtime.broadcast("hello everyone", None).await;
        assert_eq!(report.total, 5);
        assert_eq!(report.success, 5);
        assert_eq!(messenger.sent().len(), 5);
        runtime.shutdown().await;
    }

    #[tokio::test]
    async fn test_shutdown_flushes_pending_state() {
        let storage = Arc::new(MemoryStorage::new());
        let runtime =
            runtime_with(Arc::clone(&storage), Arc::new(MockMessenger::new())).await;
        runtime.record_interaction(IdentityId::new(9));
        runtime.add_channel_gate(gate(-1, "updates"));
        runtime.shutdown().await;

        assert!(storage.read_whole("user_data.json").await.unwrap().is_some());
        assert!(storage
            .read_whole("force_channels.json")
            .await
            .unwrap()
            .is_some());

        // A fresh runtime sees the flushed state
        let runtime = runtime_with(storage, Arc::new(MockMessenger::new())).await;
        assert_eq!(runtime.stats().total_identities, 1);
        assert_eq!(runtime.list_channel_gates().len(), 1);
        runtime.shutdown().await;
    }
}
