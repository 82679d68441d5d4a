//! Error types for the chatgate state layer
//!
//! Rate-limit rejection and cache misses are ordinary return values, never
//! errors. A missing storage resource at startup is a first run, and a
//! corrupt one is logged and absorbed by the store; neither surfaces here.
//! What remains are transient external failures and genuine I/O problems.

use crate::{ChannelId, IdentityId};

// ----------------------------------------------------------------------------
// Error Type
// ----------------------------------------------------------------------------

/// Core error type for the chatgate state layer
#[derive(Debug, thiserror::Error)]
pub enum ChatgateError {
    #[error("Storage error: {reason}")]
    Storage { reason: String },

    #[error("Corrupt resource {resource}: {reason}")]
    Corrupt { resource: String, reason: String },

    #[error("Send to {identity} failed: {reason}")]
    SendFailed { identity: IdentityId, reason: String },

    #[error("Membership check for {identity} in channel {channel} failed: {reason}")]
    MembershipCheckFailed {
        channel: ChannelId,
        identity: IdentityId,
        reason: String,
    },

    /// The concurrency gate was closed during shutdown
    #[error("Concurrency gate closed")]
    GateClosed,

    #[error("Configuration error: {reason}")]
    Configuration { reason: String },

    #[error("Invalid share link: {reason}")]
    InvalidLink { reason: String },

    #[error("Share-link domain not supported: {domain}")]
    UnsupportedDomain { domain: String },

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// ----------------------------------------------------------------------------
// Convenience Error Constructors
// ----------------------------------------------------------------------------

impl ChatgateError {
    /// Create a storage error with a reason
    pub fn storage_error<T: Into<String>>(reason: T) -> Self {
        ChatgateError::Storage {
            reason: reason.into(),
        }
    }

    /// Create a corrupt-resource error
    pub fn corrupt<N: Into<String>, R: Into<String>>(resource: N, reason: R) -> Self {
        ChatgateError::Corrupt {
            resource: resource.into(),
            reason: reason.into(),
        }
    }

    /// Create a send failure for a recipient
    pub fn send_failed<R: Into<String>>(identity: IdentityId, reason: R) -> Self {
        ChatgateError::SendFailed {
            identity,
            reason: reason.into(),
        }
    }

    /// Create a membership-check failure
    pub fn membership_check_failed<R: Into<String>>(
        channel: ChannelId,
        identity: IdentityId,
        reason: R,
    ) -> Self {
        ChatgateError::MembershipCheckFailed {
            channel,
            identity,
            reason: reason.into(),
        }
    }

    /// Create a configuration error with a reason
    pub fn config_error<T: Into<String>>(reason: T) -> Self {
        ChatgateError::Configuration {
            reason: reason.into(),
        }
    }

    /// Create an invalid-link error with a reason
    pub fn invalid_link<T: Into<String>>(reason: T) -> Self {
        ChatgateError::InvalidLink {
            reason: reason.into(),
        }
    }
}

// ----------------------------------------------------------------------------
// Type Aliases
// ----------------------------------------------------------------------------

pub type Result<T> = core::result::Result<T, ChatgateError>;
