//! Share-link validation
//!
//! Parses the share links handlers receive into the short id (`surl`) the
//! player pages are keyed by. Accepts full links on any supported domain as
//! well as a bare short id pasted on its own.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::{ChatgateError, Result};

/// Domains whose share links are accepted
pub const SUPPORTED_DOMAINS: &[&str] = &[
    "terabox.com",
    "1024terabox.com",
    "teraboxapp.com",
    "tibox.com",
    "terabox.fun",
];

static SHARE_LINK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"https?://([^/\s]+)/s/([a-zA-Z0-9_\-]+)").expect("share link regex")
});

static BARE_ID_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z0-9_\-]+$").expect("bare id regex"));

// ----------------------------------------------------------------------------
// Share Link
// ----------------------------------------------------------------------------

/// A validated share link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShareLink {
    /// Short id identifying the shared resource
    pub surl: String,
    /// Domain the link came from; `None` when a bare id was supplied
    pub domain: Option<String>,
}

/// Validate `text` and extract the share id.
///
/// A full link must use one of [`SUPPORTED_DOMAINS`]; anything that looks
/// like a share link on another domain is rejected as unsupported rather
/// than invalid, so callers can word the two refusals differently.
pub fn parse_share_link(text: &str) -> Result<ShareLink> {
    if let Some(captures) = SHARE_LINK_RE.captures(text) {
        let domain = &captures[1];
        let surl = &captures[2];
        if SUPPORTED_DOMAINS.iter().any(|d| domain.ends_with(d)) {
            return Ok(ShareLink {
                surl: surl.to_string(),
                domain: Some(domain.to_string()),
            });
        }
        return Err(ChatgateError::UnsupportedDomain {
            domain: domain.to_string(),
        });
    }

    let trimmed = text.trim();
    if BARE_ID_RE.is_match(trimmed) {
        return Ok(ShareLink {
            surl: trimmed.to_string(),
            domain: None,
        });
    }

    Err(ChatgateError::invalid_link(
        "Not a share link or a bare share id",
    ))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
