//! Canonical state store and persistence writer
//!
//! The store owns the identity registry, the channel-gate list, and the
//! aggregate stats behind one exclusive lock. Every mutation enqueues a
//! [`PersistTask`] under that same lock, so a completed mutation is always
//! already queued for durability; the remaining gap is only writer latency.
//!
//! Tasks carry no payload: the writer always flushes the *current* snapshot
//! of the named substate, so duplicate tasks coalesce into wasted work
//! rather than corruption, and reordering within a substate is harmless.
//!
//! Startup policy: a missing resource is a first run, an unparseable one is
//! logged and reset to empty. Neither stops the process.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use chatgate_core::{
    config::StoreConfig, AggregateStats, ChannelGate, ChannelId, IdentityId, IdentityRecord,
    Result, Timestamp,
};

use crate::storage::BlobStorage;

// ----------------------------------------------------------------------------
// Persist Tasks
// ----------------------------------------------------------------------------

/// Which substate must be flushed. No payload: the writer reads the current
/// snapshot at flush time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistTask {
    /// Identity registry + aggregate stats document
    Identities,
    /// Channel-gate list document
    Channels,
}

#[derive(Debug)]
enum WriterCommand {
    Flush(PersistTask),
    Shutdown,
}

// ----------------------------------------------------------------------------
// Persisted Documents
// ----------------------------------------------------------------------------

/// On-disk layout of the identity substate
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct IdentityDocument {
    identities: BTreeMap<IdentityId, IdentityRecord>,
    total_identities: u64,
    active_24h: u64,
    last_update: Option<Timestamp>,
}

// ----------------------------------------------------------------------------
// State Store
// ----------------------------------------------------------------------------

#[derive(Debug, Default)]
struct StoreState {
    identities: BTreeMap<IdentityId, IdentityRecord>,
    channels: Vec<ChannelGate>,
    stats: AggregateStats,
}

/// Exclusive owner of the canonical mutable state
pub struct StateStore {
    inner: Mutex<StoreState>,
    writer_tx: mpsc::UnboundedSender<WriterCommand>,
    config: StoreConfig,
}

impl StateStore {
    /// Load both substates from storage and return the store together with
    /// its (not yet running) persistence writer.
    pub async fn load(
        config: StoreConfig,
        storage: Arc<dyn BlobStorage>,
    ) -> Result<(Arc<Self>, PersistenceWriter)> {
        let identities_doc = Self::load_identity_document(&config, storage.as_ref()).await?;
        let channels = Self::load_channel_document(&config, storage.as_ref()).await?;

        let state = StoreState {
            stats: AggregateStats {
                total_identities: identities_doc.identities.len() as u64,
                active_24h: identities_doc.active_24h,
                last_update: identities_doc.last_update,
            },
            identities: identities_doc.identities,
            channels,
        };

        let (writer_tx, writer_rx) = mpsc::unbounded_channel();
        let store = Arc::new(Self {
            inner: Mutex::new(state),
            writer_tx,
            config,
        });
        let writer = PersistenceWriter {
            store: Arc::clone(&store),
            storage,
            rx: writer_rx,
        };
        Ok((store, writer))
    }

    async fn load_identity_document(
        config: &StoreConfig,
        storage: &dyn BlobStorage,
    ) -> Result<IdentityDocument> {
        let empty = IdentityDocument {
            identities: BTreeMap::new(),
            total_identities: 0,
            active_24h: 0,
            last_update: None,
        };
        match storage.read_whole(&config.identity_resource).await? {
            Some(bytes) => match serde_json::from_slice::<IdentityDocument>(&bytes) {
                Ok(doc) => {
                    info!(
                        identities = doc.identities.len(),
                        resource = %config.identity_resource,
                        "loaded identity registry"
                    );
                    Ok(doc)
                }
                Err(err) => {
                    error!(
                        resource = %config.identity_resource,
                        %err,
                        "identity document is corrupt, resetting to empty"
                    );
                    Ok(empty)
                }
            },
            None => {
                info!(
                    resource = %config.identity_resource,
                    "no identity document found, starting fresh"
                );
                Ok(empty)
            }
        }
    }

    async fn load_channel_document(
        config: &StoreConfig,
        storage: &dyn BlobStorage,
    ) -> Result<Vec<ChannelGate>> {
        match storage.read_whole(&config.channel_resource).await? {
            Some(bytes) => match serde_json::from_slice::<Vec<ChannelGate>>(&bytes) {
                Ok(channels) => {
                    info!(
                        channels = channels.len(),
                        resource = %config.channel_resource,
                        "loaded channel gates"
                    );
                    Ok(channels)
                }
                Err(err) => {
                    error!(
                        resource = %config.channel_resource,
                        %err,
                        "channel document is corrupt, resetting to empty"
                    );
                    Ok(Vec::new())
                }
            },
            None => {
                info!(
                    resource = %config.channel_resource,
                    "no channel document found, starting fresh"
                );
                Ok(Vec::new())
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, StoreState> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Mutation and task enqueue happen under the already-held lock, so the
    /// window between mutation and queued durability is zero.
    fn enqueue(&self, task: PersistTask) {
        // Send only fails after writer shutdown, when no flush can happen
        // anyway.
        let _ = self.writer_tx.send(WriterCommand::Flush(task));
    }

    // ------------------------------------------------------------------
    // Identity registry
    // ------------------------------------------------------------------

    /// Register an interaction: create the record on first occurrence,
    /// update last-seen and the counter on repeats. Returns immediately with
    /// a copy of the record; durability happens asynchronously.
    pub fn record_interaction(&self, identity: IdentityId) -> IdentityRecord {
        let now = Timestamp::now();
        let mut state = self.lock();
        let record = match state.identities.get_mut(&identity) {
            Some(record) => {
                record.touch(now);
                record.clone()
            }
            None => {
                let record = IdentityRecord::first_interaction(now);
                state.identities.insert(identity, record.clone());
                state.stats.total_identities = state.identities.len() as u64;
                info!(%identity, total = state.stats.total_identities, "new identity registered");
                record
            }
        };
        self.enqueue(PersistTask::Identities);
        record
    }

    /// Canonical record for one identity, if registered
    pub fn get_identity(&self, identity: IdentityId) -> Option<IdentityRecord> {
        self.lock().identities.get(&identity).cloned()
    }

    /// All registered identity ids
    pub fn identity_ids(&self) -> Vec<IdentityId> {
        self.lock().identities.keys().copied().collect()
    }

    // ------------------------------------------------------------------
    // Channel gates
    // ------------------------------------------------------------------

    /// Independent snapshot of the gate list
    pub fn list_channel_gates(&self) -> Vec<ChannelGate> {
        self.lock().channels.clone()
    }

    /// Add a gate; returns `false` without mutating if the channel id is
    /// already gated
    pub fn add_channel_gate(&self, gate: ChannelGate) -> bool {
        let mut state = self.lock();
        if state.channels.iter().any(|c| c.id == gate.id) {
            return false;
        }
        info!(channel = %gate.id, title = %gate.title, "channel gate added");
        state.channels.push(gate);
        self.enqueue(PersistTask::Channels);
        true
    }

    /// Remove the gate for `channel`; returns whether one was present
    pub fn remove_channel_gate(&self, channel: ChannelId) -> bool {
        let mut state = self.lock();
        let before = state.channels.len();
        state.channels.retain(|c| c.id != channel);
        if state.channels.len() < before {
            info!(%channel, "channel gate removed");
            self.enqueue(PersistTask::Channels);
            true
        } else {
            false
        }
    }

    /// Remove every gate, returning how many were removed
    pub fn clear_channel_gates(&self) -> usize {
        let mut state = self.lock();
        let removed = state.channels.len();
        state.channels.clear();
        if removed > 0 {
            info!(removed, "all channel gates cleared");
        }
        self.enqueue(PersistTask::Channels);
        removed
    }

    // ------------------------------------------------------------------
    // Aggregate statistics
    // ------------------------------------------------------------------

    /// Read-only stats snapshot; the total is always live, the active count
    /// is as of the last recompute
    pub fn get_stats(&self) -> AggregateStats {
        let state = self.lock();
        AggregateStats {
            total_identities: state.identities.len() as u64,
            ..state.stats
        }
    }

    /// Scan all records and recount identities whose last interaction falls
    /// within the trailing active window ending at `now`. Returns the count.
    pub fn recompute_active_window(&self, now: Timestamp) -> u64 {
        let cutoff_millis = now
            .as_millis()
            .saturating_sub(self.config.active_window_secs * 1000);
        let mut state = self.lock();
        let active = state
            .identities
            .values()
            .filter(|record| record.last_seen.as_millis() >= cutoff_millis)
            .count() as u64;
        state.stats.active_24h = active;
        state.stats.last_update = Some(now);
        state.stats.total_identities = state.identities.len() as u64;
        self.enqueue(PersistTask::Identities);
        info!(active, "active window recomputed");
        active
    }

    // ------------------------------------------------------------------
    // Writer plumbing
    // ------------------------------------------------------------------

    /// Ask the writer to exit once it has drained everything queued so far
    pub fn shutdown_writer(&self) {
        let _ = self.writer_tx.send(WriterCommand::Shutdown);
    }

    /// Serialize the named substate's current snapshot
    fn snapshot(&self, task: PersistTask) -> Result<(String, Vec<u8>)> {
        let state = self.lock();
        match task {
            PersistTask::Identities => {
                let doc = IdentityDocument {
                    identities: state.identities.clone(),
                    total_identities: state.identities.len() as u64,
                    active_24h: state.stats.active_24h,
                    last_update: state.stats.last_update,
                };
                let bytes = serde_json::to_vec_pretty(&doc)?;
                Ok((self.config.identity_resource.clone(), bytes))
            }
            PersistTask::Channels => {
                let bytes = serde_json::to_vec_pretty(&state.channels)?;
                Ok((self.config.channel_resource.clone(), bytes))
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Persistence Writer
// ----------------------------------------------------------------------------

/// Single background task draining the durability queue. Each flush writes
/// the full current snapshot, so the most recent write always wins. I/O
/// failures are logged and the loop continues; only an explicit shutdown
/// (or the store being dropped) stops it.
pub struct PersistenceWriter {
    store: Arc<StateStore>,
    storage: Arc<dyn BlobStorage>,
    rx: mpsc::UnboundedReceiver<WriterCommand>,
}

impl PersistenceWriter {
    /// Drain the queue until shutdown
    pub async fn run(mut self) {
        info!("persistence writer started");
        while let Some(command) = self.rx.recv().await {
            match command {
                WriterCommand::Flush(task) => {
                    // Snapshot under the lock, write without it.
                    let (resource, bytes) = match self.store.snapshot(task) {
                        Ok(snapshot) => snapshot,
                        Err(err) => {
                            error!(?task, %err, "failed to serialize snapshot");
                            continue;
                        }
                    };
                    match self.storage.write_whole(&resource, bytes).await {
                        Ok(()) => debug!(%resource, "snapshot flushed"),
                        Err(err) => error!(%resource, %err, "snapshot flush failed"),
                    }
                }
                WriterCommand::Shutdown => break,
            }
        }
        info!("persistence writer stopped");
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn gate(id: i64, title: &str) -> ChannelGate {
        ChannelGate {
            id: ChannelId::new(id),
            title: title.into(),
            handle: None,
            invite_ref: format!("https://t.me/{title}"),
            added_by: IdentityId::new(1),
            added_date: Timestamp::now(),
        }
    }

    async fn fresh_store() -> (Arc<StateStore>, PersistenceWriter, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let (store, writer) = StateStore::load(StoreConfig::default(), storage.clone())
            .await
            .unwrap();
        (store, writer, storage)
    }

    #[tokio::test]
    async fn test_first_run_starts_empty() {
        let (store, _writer, _storage) = fresh_store().await;
        assert!(store.identity_ids().is_empty());
        assert!(store.list_channel_gates().is_empty());
        assert_eq!(store.get_stats(), AggregateStats::default());
    }

    #[tokio::test]
    async fn test_record_interaction_registration() {
        let (store, _writer, _storage) = fresh_store().await;
        let identity = IdentityId::new(42);

        let first = store.record_interaction(identity);
        assert_eq!(first.total_interactions, 1);

        let second = store.record_interaction(identity);
        assert_eq!(second.total_interactions, 2);
        assert_eq!(second.first_seen, first.first_seen);
        assert!(second.last_seen >= first.last_seen);

        assert_eq!(store.get_stats().total_identities, 1);
        assert_eq!(store.identity_ids(), vec![identity]);
    }

    #[tokio::test]
    async fn test_channel_gate_crud() {
        let (store, _writer, _storage) = fresh_store().await;

        assert!(store.add_channel_gate(gate(-1, "updates")));
        assert!(!store.add_channel_gate(gate(-1, "updates-duplicate")));
        assert!(store.add_channel_gate(gate(-2, "news")));
        assert_eq!(store.list_channel_gates().len(), 2);

        assert!(store.remove_channel_gate(ChannelId::new(-1)));
        assert!(!store.remove_channel_gate(ChannelId::new(-1)));
        assert_eq!(store.clear_channel_gates(), 1);
        assert!(store.list_channel_gates().is_empty());
    }

    #[tokio::test]
    async fn test_snapshots_are_independent_copies() {
        let (store, _writer, _storage) = fresh_store().await;
        store.add_channel_gate(gate(-1, "updates"));

        let mut snapshot = store.list_channel_gates();
        snapshot.clear();
        assert_eq!(store.list_channel_gates().len(), 1);
    }

    #[tokio::test]
    async fn test_writer_flushes_matching_snapshot() {
        let (store, writer, storage) = fresh_store().await;
        let handle = tokio::spawn(writer.run());

        let identity = IdentityId::new(7);
        store.record_interaction(identity);
        store.record_interaction(identity);
        store.add_channel_gate(gate(-1, "updates"));

        store.shutdown_writer();
        handle.await.unwrap();

        let bytes = storage
            .read_whole("user_data.json")
            .await
            .unwrap()
            .expect("identity document flushed");
        let doc: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc["totalIdentities"], 1);
        assert_eq!(doc["identities"]["7"]["totalInteractions"], 2);

        let bytes = storage
            .read_whole("force_channels.json")
            .await
            .unwrap()
            .expect("channel document flushed");
        let channels: Vec<ChannelGate> = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(channels.len(), 1);
        assert_eq!(channels[0].id, ChannelId::new(-1));
    }

    #[tokio::test]
    async fn test_writer_survives_storage_failure() {
        let (store, writer, storage) = fresh_store().await;
        let handle = tokio::spawn(writer.run());

        storage.set_available(false);
        store.record_interaction(IdentityId::new(1));
        tokio::task::yield_now().await;

        // Writer logged the failure and kept running; a later flush succeeds
        storage.set_available(true);
        store.record_interaction(IdentityId::new(1));
        store.shutdown_writer();
        handle.await.unwrap();

        assert!(storage
            .read_whole("user_data.json")
            .await
            .unwrap()
            .is_some());
    }

    #[tokio::test]
    async fn test_state_survives_reload() {
        let storage = Arc::new(MemoryStorage::new());
        {
            let (store, writer) = StateStore::load(StoreConfig::default(), storage.clone())
                .await
                .unwrap();
            let handle = tokio::spawn(writer.run());
            store.record_interaction(IdentityId::new(5));
            store.add_channel_gate(gate(-9, "updates"));
            store.shutdown_writer();
            handle.await.unwrap();
        }

        let (store, _writer) = StateStore::load(StoreConfig::default(), storage)
            .await
            .unwrap();
        assert_eq!(store.identity_ids(), vec![IdentityId::new(5)]);
        assert_eq!(store.list_channel_gates().len(), 1);
    }

    #[tokio::test]
    async fn test_corrupt_documents_reset_to_empty() {
        let storage = Arc::new(MemoryStorage::with_blobs([
            ("user_data.json".to_string(), b"not json".to_vec()),
            ("force_channels.json".to_string(), b"{broken".to_vec()),
        ]));
        let (store, _writer) = StateStore::load(StoreConfig::default(), storage)
            .await
            .unwrap();
        assert!(store.identity_ids().is_empty());
        assert!(store.list_channel_gates().is_empty());
    }

    #[tokio::test]
    async fn test_recompute_active_window() {
        let (store, _writer, _storage) = fresh_store().await;
        store.record_interaction(IdentityId::new(1));
        store.record_interaction(IdentityId::new(2));

        let now = Timestamp::now();
        assert_eq!(store.recompute_active_window(now), 2);

        // A day later neither identity is active any more
        let later = now.add_seconds(86_400 + 60);
        assert_eq!(store.recompute_active_window(later), 0);

        let stats = store.get_stats();
        assert_eq!(stats.active_24h, 0);
        assert_eq!(stats.last_update, Some(later));
        assert_eq!(stats.total_identities, 2);
    }
}
