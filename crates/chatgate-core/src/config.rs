//! Centralized configuration
//!
//! All tunables of the state layer in one place, with defaults matching the
//! deployed bot. Everything serializes so a deployment can load the whole
//! tree from one JSON document.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::IdentityId;

// ----------------------------------------------------------------------------
// Cache Configuration
// ----------------------------------------------------------------------------

/// Size and TTL for a single cache instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheSettings {
    /// Maximum live entries before eviction
    pub max_entries: usize,
    /// Entry lifetime in seconds
    pub ttl_secs: u64,
}

impl CacheSettings {
    /// TTL as a duration
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_secs)
    }
}

/// Settings for the three caches the manager composes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Identity-record snapshots
    pub identity: CacheSettings,
    /// Membership-check outcomes
    pub membership: CacheSettings,
    /// Derived per-channel statistics
    pub channel_stats: CacheSettings,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            identity: CacheSettings {
                max_entries: 10_000,
                ttl_secs: 300,
            },
            membership: CacheSettings {
                max_entries: 20_000,
                ttl_secs: 300,
            },
            channel_stats: CacheSettings {
                max_entries: 10,
                ttl_secs: 300,
            },
        }
    }
}

// ----------------------------------------------------------------------------
// Rate Limiting Configuration
// ----------------------------------------------------------------------------

/// Configuration for the per-identity rate limiter
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    /// Maximum admitted calls per identity per window
    pub requests_per_window: u32,
    /// Window length in seconds
    pub window_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_window: 10, // 10 requests per identity per minute
            window_secs: 60,
        }
    }
}

impl RateLimitConfig {
    /// Permissive limits for tests
    pub fn permissive() -> Self {
        Self {
            requests_per_window: 10_000,
            window_secs: 60,
        }
    }
}

// ----------------------------------------------------------------------------
// Concurrency Gate Configuration
// ----------------------------------------------------------------------------

/// Configuration for the global concurrency gate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GateConfig {
    /// Hard bound on simultaneously in-flight handler executions
    pub max_concurrent: usize,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 100,
        }
    }
}

// ----------------------------------------------------------------------------
// Broadcast Configuration
// ----------------------------------------------------------------------------

/// Configuration for batched broadcast delivery
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BroadcastConfig {
    /// Recipients per batch; all sends in a batch run concurrently
    pub batch_size: usize,
    /// Client-side pause between batches, in milliseconds
    pub batch_delay_ms: u64,
}

impl Default for BroadcastConfig {
    fn default() -> Self {
        Self {
            batch_size: 20,
            batch_delay_ms: 100,
        }
    }
}

impl BroadcastConfig {
    /// Inter-batch delay as a duration
    pub fn batch_delay(&self) -> Duration {
        Duration::from_millis(self.batch_delay_ms)
    }
}

// ----------------------------------------------------------------------------
// Periodic Statistics Configuration
// ----------------------------------------------------------------------------

/// Configuration for the daily active-window recomputation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsConfig {
    /// Local hour (0-23) of the daily recompute
    pub recompute_hour: u8,
    /// Local minute (0-59) of the daily recompute
    pub recompute_minute: u8,
    /// Offset of local time from UTC, in seconds
    pub utc_offset_secs: i32,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            recompute_hour: 5,
            recompute_minute: 30,
            utc_offset_secs: 19_800, // UTC+5:30
        }
    }
}

// ----------------------------------------------------------------------------
// Store Configuration
// ----------------------------------------------------------------------------

/// Configuration for the canonical state store
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Blob name of the identity document
    pub identity_resource: String,
    /// Blob name of the channel document
    pub channel_resource: String,
    /// Trailing window counted as "active", in seconds
    pub active_window_secs: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            identity_resource: "user_data.json".into(),
            channel_resource: "force_channels.json".into(),
            active_window_secs: 86_400,
        }
    }
}

// ----------------------------------------------------------------------------
// Top-Level Configuration
// ----------------------------------------------------------------------------

/// Complete configuration of the chatgate state layer
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChatgateConfig {
    /// Static admin allow-list; the only authorization the layer performs
    pub admins: Vec<IdentityId>,
    pub cache: CacheConfig,
    pub rate_limit: RateLimitConfig,
    pub gate: GateConfig,
    pub broadcast: BroadcastConfig,
    pub stats: StatsConfig,
    pub store: StoreConfig,
}

impl ChatgateConfig {
    /// Whether `identity` is on the static admin allow-list
    pub fn is_admin(&self, identity: IdentityId) -> bool {
        self.admins.contains(&identity)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_deployment() {
        let config = ChatgateConfig::default();
        assert_eq!(config.gate.max_concurrent, 100);
        assert_eq!(config.broadcast.batch_size, 20);
        assert_eq!(config.broadcast.batch_delay(), Duration::from_millis(100));
        assert_eq!(config.rate_limit.requests_per_window, 10);
        assert_eq!(config.rate_limit.window_secs, 60);
        assert_eq!(config.cache.identity.max_entries, 10_000);
        assert_eq!(config.cache.membership.max_entries, 20_000);
        assert_eq!(config.cache.identity.ttl(), Duration::from_secs(300));
        assert_eq!(config.stats.recompute_hour, 5);
        assert_eq!(config.store.identity_resource, "user_data.json");
    }

    #[test]
    fn test_admin_allow_list() {
        let config = ChatgateConfig {
            admins: vec![IdentityId::new(7)],
            ..Default::default()
        };
        assert!(config.is_admin(IdentityId::new(7)));
        assert!(!config.is_admin(IdentityId::new(8)));
    }

    #[test]
    fn test_config_roundtrips_through_json() {
        let config = ChatgateConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: ChatgateConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.gate.max_concurrent, config.gate.max_concurrent);
        assert_eq!(back.store.active_window_secs, 86_400);
    }
}
