//! Canonical and derived record types
//!
//! The state store in `chatgate-runtime` exclusively owns the canonical
//! copies of these records; the TTL caches hold disposable snapshots that
//! can always be recomputed. Field names are renamed to camelCase so the
//! persisted JSON documents keep the layout the deployed bot already wrote.

use serde::{Deserialize, Serialize};

use crate::{ChannelId, IdentityId, Timestamp};

// ----------------------------------------------------------------------------
// Identity Record
// ----------------------------------------------------------------------------

/// Per-identity interaction record. Created on first interaction, updated on
/// every subsequent one, never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdentityRecord {
    /// When this identity was first observed
    pub first_seen: Timestamp,
    /// When this identity was last observed
    pub last_seen: Timestamp,
    /// Total interactions since first seen
    pub total_interactions: u64,
}

impl IdentityRecord {
    /// Create the record for a first interaction at `now`
    pub fn first_interaction(now: Timestamp) -> Self {
        Self {
            first_seen: now,
            last_seen: now,
            total_interactions: 1,
        }
    }

    /// Register a repeat interaction at `now`
    pub fn touch(&mut self, now: Timestamp) {
        self.last_seen = now;
        self.total_interactions += 1;
    }
}

// ----------------------------------------------------------------------------
// Channel Gate
// ----------------------------------------------------------------------------

/// A channel whose membership is required before handlers serve an identity.
/// Presence or absence in the gate list is the sole input to membership
/// checks.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelGate {
    /// Platform chat id of the channel
    pub id: ChannelId,
    /// Display title
    pub title: String,
    /// Public handle, if the channel has one
    pub handle: Option<String>,
    /// Invite reference shown to identities that still need to join
    pub invite_ref: String,
    /// Admin who added the gate
    pub added_by: IdentityId,
    /// When the gate was added
    pub added_date: Timestamp,
}

// ----------------------------------------------------------------------------
// Aggregate Statistics
// ----------------------------------------------------------------------------

/// Registry-wide statistics, recomputed by the periodic job rather than on
/// every mutation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AggregateStats {
    /// Total identities ever registered
    pub total_identities: u64,
    /// Identities active in the trailing 24 hour window
    pub active_24h: u64,
    /// When the active window was last recomputed
    pub last_update: Option<Timestamp>,
}

// ----------------------------------------------------------------------------
// Membership Outcome
// ----------------------------------------------------------------------------

/// Result of checking one identity against the full channel-gate list.
/// Cached copies are deleted outright on invalidation; there is no
/// "explicitly cleared" sentinel state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipOutcome {
    /// Whether the identity is a member of every gated channel
    pub joined_all: bool,
    /// Gates the identity still needs to join
    pub missing: Vec<ChannelGate>,
}

impl MembershipOutcome {
    /// Outcome for an identity that satisfies every gate (or no gates exist)
    pub fn satisfied() -> Self {
        Self {
            joined_all: true,
            missing: Vec::new(),
        }
    }

    /// Outcome built from the list of gates still missing
    pub fn with_missing(missing: Vec<ChannelGate>) -> Self {
        Self {
            joined_all: missing.is_empty(),
            missing,
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
