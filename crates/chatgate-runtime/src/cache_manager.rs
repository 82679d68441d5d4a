//! Composed cache manager
//!
//! Bundles the three TTL caches (identity snapshots, membership outcomes,
//! per-channel derived stats) with the rate limiter and the concurrency
//! gate. Each cache and the limiter keep their own lock, so unrelated
//! operations never contend. Cached values are disposable copies; the
//! canonical state lives in the store.

use chatgate_core::{
    config::{CacheConfig, GateConfig, RateLimitConfig},
    ChannelId, IdentityId, IdentityRecord, MembershipOutcome, RateLimiter, RateLimiterStats,
    TtlCache,
};

use crate::gate::{ConcurrencyGate, GatePermit};

// ----------------------------------------------------------------------------
// Cache Manager
// ----------------------------------------------------------------------------

/// Caching and admission layer consulted by every handler
pub struct CacheManager {
    identity_cache: TtlCache<IdentityId, IdentityRecord>,
    membership_cache: TtlCache<IdentityId, MembershipOutcome>,
    channel_stats_cache: TtlCache<ChannelId, u64>,
    rate_limiter: RateLimiter,
    gate: ConcurrencyGate,
}

impl CacheManager {
    /// Create the manager from configuration
    pub fn new(cache: &CacheConfig, rate_limit: &RateLimitConfig, gate: &GateConfig) -> Self {
        Self {
            identity_cache: TtlCache::from_settings(&cache.identity),
            membership_cache: TtlCache::from_settings(&cache.membership),
            channel_stats_cache: TtlCache::from_settings(&cache.channel_stats),
            rate_limiter: RateLimiter::new(rate_limit),
            gate: ConcurrencyGate::new(gate),
        }
    }

    // ------------------------------------------------------------------
    // Identity snapshots
    // ------------------------------------------------------------------

    /// Cached identity-record snapshot, if fresh
    pub fn get_identity(&self, identity: IdentityId) -> Option<IdentityRecord> {
        self.identity_cache.get(&identity)
    }

    /// Cache an identity-record snapshot
    pub fn set_identity(&self, identity: IdentityId, record: IdentityRecord) {
        self.identity_cache.insert(identity, record);
    }

    // ------------------------------------------------------------------
    // Membership outcomes
    // ------------------------------------------------------------------

    /// Cached membership outcome, if fresh
    pub fn get_membership(&self, identity: IdentityId) -> Option<MembershipOutcome> {
        self.membership_cache.get(&identity)
    }

    /// Cache a membership outcome
    pub fn set_membership(&self, identity: IdentityId, outcome: MembershipOutcome) {
        self.membership_cache.insert(identity, outcome);
    }

    /// Invalidate one identity's membership outcome. The entry is deleted
    /// outright, so the next check recomputes; there is no cleared sentinel.
    pub fn invalidate_membership(&self, identity: IdentityId) {
        self.membership_cache.remove(&identity);
    }

    /// Invalidate every membership outcome. Called whenever the channel-gate
    /// list changes so no identity keeps a stale "already satisfied" result.
    pub fn clear_memberships(&self) {
        self.membership_cache.clear();
    }

    // ------------------------------------------------------------------
    // Derived channel stats
    // ------------------------------------------------------------------

    /// Cached joined-count for a channel, if fresh
    pub fn get_channel_stat(&self, channel: ChannelId) -> Option<u64> {
        self.channel_stats_cache.get(&channel)
    }

    /// Cache a joined-count for a channel
    pub fn set_channel_stat(&self, channel: ChannelId, count: u64) {
        self.channel_stats_cache.insert(channel, count);
    }

    // ------------------------------------------------------------------
    // Admission
    // ------------------------------------------------------------------

    /// Sliding-window rate check for one identity
    pub fn check_rate_limit(&self, identity: IdentityId) -> bool {
        self.rate_limiter.check(identity)
    }

    /// Acquire a slot in the global concurrency gate
    pub async fn acquire(&self) -> chatgate_core::Result<GatePermit> {
        self.gate.acquire().await
    }

    /// The underlying gate, for diagnostics
    pub fn gate(&self) -> &ConcurrencyGate {
        &self.gate
    }

    /// Limiter usage, for diagnostics
    pub fn rate_limiter_stats(&self) -> RateLimiterStats {
        self.rate_limiter.stats()
    }

    /// Drop expired cache entries and stale rate windows. Invoked by the
    /// periodic job; day-to-day expiry stays lazy.
    pub fn sweep(&self) {
        self.identity_cache.purge_expired();
        self.membership_cache.purge_expired();
        self.channel_stats_cache.purge_expired();
        self.rate_limiter.sweep();
    }

    /// Membership-cache size, for diagnostics
    pub fn membership_cache_len(&self) -> usize {
        self.membership_cache.len()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chatgate_core::{ChatgateConfig, Timestamp};

    fn manager() -> CacheManager {
        let config = ChatgateConfig::default();
        CacheManager::new(&config.cache, &config.rate_limit, &config.gate)
    }

    #[test]
    fn test_identity_snapshot_roundtrip() {
        let manager = manager();
        let identity = IdentityId::new(1);
        assert!(manager.get_identity(identity).is_none());

        let record = IdentityRecord::first_interaction(Timestamp::new(0));
        manager.set_identity(identity, record.clone());
        assert_eq!(manager.get_identity(identity), Some(record));
    }

    #[test]
    fn test_membership_invalidation_deletes_entry() {
        let manager = manager();
        let identity = IdentityId::new(1);
        manager.set_membership(identity, MembershipOutcome::satisfied());
        assert!(manager.get_membership(identity).is_some());

        manager.invalidate_membership(identity);
        assert!(manager.get_membership(identity).is_none());

        manager.set_membership(identity, MembershipOutcome::satisfied());
        manager.set_membership(IdentityId::new(2), MembershipOutcome::satisfied());
        manager.clear_memberships();
        assert_eq!(manager.membership_cache_len(), 0);
    }

    #[test]
    fn test_rate_limit_delegates() {
        let config = ChatgateConfig {
            rate_limit: chatgate_core::RateLimitConfig {
                requests_per_window: 2,
                window_secs: 60,
            },
            ..Default::default()
        };
        let manager = CacheManager::new(&config.cache, &config.rate_limit, &config.gate);
        let identity = IdentityId::new(9);

        assert!(manager.check_rate_limit(identity));
        assert!(manager.check_rate_limit(identity));
        assert!(!manager.check_rate_limit(identity));
        assert_eq!(manager.rate_limiter_stats().tracked_identities, 1);
    }

    #[tokio::test]
    async fn test_gate_delegates() {
        let manager = manager();
        let permit = manager.acquire().await.unwrap();
        assert_eq!(manager.gate().available(), manager.gate().capacity() - 1);
        drop(permit);
        assert_eq!(manager.gate().available(), manager.gate().capacity());
    }
}
