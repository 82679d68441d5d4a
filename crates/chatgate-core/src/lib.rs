//! Chatgate Core Primitives
//!
//! This crate provides the synchronous building blocks of the chatgate state
//! layer: a capacity-bounded TTL cache, a per-identity sliding-window rate
//! limiter, share-link validation, and the shared record and configuration
//! types. Everything here uses plain mutual-exclusion locks so it can be
//! reached from any execution context; the tokio orchestration lives in
//! `chatgate-runtime`.

// ----------------------------------------------------------------------------
// Module Declarations
// ----------------------------------------------------------------------------

pub mod cache;
pub mod config;
pub mod errors;
pub mod link;
pub mod rate_limiter;
pub mod records;
pub mod types;

// ----------------------------------------------------------------------------
// Public API
// ----------------------------------------------------------------------------

pub use cache::TtlCache;
pub use config::{
    BroadcastConfig, CacheConfig, CacheSettings, ChatgateConfig, GateConfig, RateLimitConfig,
    StatsConfig, StoreConfig,
};
pub use errors::{ChatgateError, Result};
pub use link::{parse_share_link, ShareLink, SUPPORTED_DOMAINS};
pub use rate_limiter::{RateLimiter, RateLimiterStats};
pub use records::{AggregateStats, ChannelGate, IdentityRecord, MembershipOutcome};
pub use types::{ChannelId, IdentityId, Timestamp};
