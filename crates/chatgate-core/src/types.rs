//! Core identifier and time types
//!
//! Newtype wrappers over the raw chat-platform integers, so identity and
//! channel ids cannot be swapped by accident, plus a millisecond timestamp
//! used for persisted records.

use core::fmt;
use core::ops::Sub;
use core::str::FromStr;
use serde::{Deserialize, Serialize};

// ----------------------------------------------------------------------------
// Identity Identifier
// ----------------------------------------------------------------------------

/// Unique identifier for a chat identity (platform user id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct IdentityId(i64);

impl IdentityId {
    /// Create a new identity id
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw platform id
    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for IdentityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for IdentityId {
    type Err = crate::ChatgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| crate::ChatgateError::config_error("Invalid identity id"))
    }
}

// ----------------------------------------------------------------------------
// Channel Identifier
// ----------------------------------------------------------------------------

/// Unique identifier for a channel gate (platform chat id)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(i64);

impl ChannelId {
    /// Create a new channel id
    pub fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Get the raw platform id
    pub fn raw(&self) -> i64 {
        self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChannelId {
    type Err = crate::ChatgateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| crate::ChatgateError::config_error("Invalid channel id"))
    }
}

// ----------------------------------------------------------------------------
// Timestamp
// ----------------------------------------------------------------------------

/// Millisecond timestamp since Unix epoch
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Create a timestamp from raw milliseconds
    pub fn new(millis: u64) -> Self {
        Self(millis)
    }

    /// Get the current wall-clock timestamp
    pub fn now() -> Self {
        use std::time::{SystemTime, UNIX_EPOCH};
        let duration = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        Self(duration.as_millis() as u64)
    }

    /// Get the raw milliseconds
    pub fn as_millis(&self) -> u64 {
        self.0
    }

    /// Get the whole seconds component
    pub fn as_secs(&self) -> u64 {
        self.0 / 1000
    }

    /// Add seconds to this timestamp
    pub fn add_seconds(&self, seconds: u64) -> Self {
        Self(self.0 + seconds * 1000)
    }

    /// Duration elapsed since another (earlier) timestamp
    pub fn duration_since(&self, other: Self) -> core::time::Duration {
        core::time::Duration::from_millis(self.0.saturating_sub(other.0))
    }
}

impl Sub for Timestamp {
    type Output = u64;

    fn sub(self, other: Timestamp) -> u64 {
        self.0.saturating_sub(other.0)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
