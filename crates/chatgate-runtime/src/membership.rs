//! Channel-gate membership checks
//!
//! Answers "has this identity joined every gated channel", backed by the
//! membership cache so repeat checks within the TTL cost nothing. A failed
//! status query counts the gate as not joined: the caller re-prompts rather
//! than waving the identity through on an outage.

use std::sync::Arc;
use tracing::{debug, warn};

use chatgate_core::{ChannelId, IdentityId, MembershipOutcome};

use crate::cache_manager::CacheManager;
use crate::messaging::Messenger;
use crate::store::StateStore;

// ----------------------------------------------------------------------------
// Membership Checker
// ----------------------------------------------------------------------------

/// Evaluates identities against the current channel-gate list
pub struct MembershipChecker {
    store: Arc<StateStore>,
    cache: Arc<CacheManager>,
    messenger: Arc<dyn Messenger>,
}

impl MembershipChecker {
    pub fn new(
        store: Arc<StateStore>,
        cache: Arc<CacheManager>,
        messenger: Arc<dyn Messenger>,
    ) -> Self {
        Self {
            store,
            cache,
            messenger,
        }
    }

    /// Whether `identity` has joined every gated channel, with the missing
    /// gates listed for re-prompting. Served from cache when fresh; a
    /// recomputed outcome is cached before returning. No gates means
    /// trivially satisfied.
    pub async fn check(&self, identity: IdentityId) -> MembershipOutcome {
        if let Some(outcome) = self.cache.get_membership(identity) {
            debug!(%identity, joined_all = outcome.joined_all, "membership served from cache");
            return outcome;
        }

        let gates = self.store.list_channel_gates();
        if gates.is_empty() {
            let outcome = MembershipOutcome::satisfied();
            self.cache.set_membership(identity, outcome.clone());
            return outcome;
        }

        let mut missing = Vec::new();
        for gate in gates {
            match self.messenger.membership_status(gate.id, identity).await {
                Ok(status) if status.satisfies_gate() => {}
                Ok(_) => missing.push(gate),
                Err(err) => {
                    // Unknown standing blocks the gate rather than passing it
                    warn!(channel = %gate.id, %identity, %err, "membership query failed");
                    missing.push(gate);
                }
            }
        }

        let outcome = if missing.is_empty() {
            MembershipOutcome::satisfied()
        } else {
            MembershipOutcome::with_missing(missing)
        };
        self.cache.set_membership(identity, outcome.clone());
        outcome
    }

    /// How many registered identities are currently members of `channel`.
    /// Cached per channel; recomputation scans every registered identity.
    pub async fn channel_join_count(&self, channel: ChannelId) -> u64 {
        if let Some(count) = self.cache.get_channel_stat(channel) {
            return count;
        }

        let mut joined = 0u64;
        for identity in self.store.identity_ids() {
            match self.messenger.membership_status(channel, identity).await {
                Ok(status) if status.satisfies_gate() => joined += 1,
                Ok(_) => {}
                Err(err) => {
                    warn!(%channel, %identity, %err, "membership query failed during count");
                }
            }
        }
        self.cache.set_channel_stat(channel, joined);
        joined
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
