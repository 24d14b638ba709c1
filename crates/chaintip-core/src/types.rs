//! Shared types for the follower pipeline.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::TipError;

// ─── RawBlock ─────────────────────────────────────────────────────────────────

/// Block data as delivered by an upstream endpoint, before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    /// Block hash as delivered (any case, `0x` prefix optional).
    pub hash: String,
    /// Chain timestamp in seconds since epoch, if the endpoint supplied one.
    pub timestamp: Option<i64>,
    /// Number of transactions; `None` when the transaction list was absent.
    pub transaction_count: Option<u32>,
}

impl RawBlock {
    pub fn new(number: u64, hash: impl Into<String>) -> Self {
        Self {
            number,
            hash: hash.into(),
            timestamp: None,
            transaction_count: None,
        }
    }

    pub fn with_timestamp(mut self, secs: i64) -> Self {
        self.timestamp = Some(secs);
        self
    }

    pub fn with_transactions(mut self, count: u32) -> Self {
        self.transaction_count = Some(count);
        self
    }
}

// ─── BlockRecord ──────────────────────────────────────────────────────────────

/// The canonical, persisted block header.
///
/// Serializes to the flat mapping subscribers and the query surface expect:
/// `block_number`, `timestamp`, `hash`, `transaction_count`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRecord {
    #[serde(rename = "block_number")]
    pub height: u64,
    #[serde(rename = "timestamp")]
    pub observed_at: DateTime<Utc>,
    pub hash: String,
    pub transaction_count: u32,
}

impl BlockRecord {
    /// Normalize a [`RawBlock`].
    ///
    /// `now` is used as `observed_at` when the upstream did not supply a chain
    /// timestamp.
    pub fn from_raw(raw: &RawBlock, now: DateTime<Utc>) -> Result<Self, TipError> {
        let hash = canonical_hash(&raw.hash).ok_or_else(|| TipError::BlockFetch {
            height: raw.number,
            reason: format!("invalid block hash {:?}", raw.hash),
        })?;

        let observed_at = match raw.timestamp {
            Some(secs) => DateTime::from_timestamp(secs, 0).ok_or_else(|| TipError::BlockFetch {
                height: raw.number,
                reason: format!("timestamp {secs} out of range"),
            })?,
            None => now,
        };

        Ok(Self {
            height: raw.number,
            observed_at,
            hash,
            transaction_count: raw.transaction_count.unwrap_or(0),
        })
    }
}

/// Canonical hash form: `0x` followed by lowercase hex digits.
///
/// Returns `None` if the input is empty or contains non-hex characters.
pub fn canonical_hash(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let digits = trimmed
        .strip_prefix("0x")
        .or_else(|| trimmed.strip_prefix("0X"))
        .unwrap_or(trimmed);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(format!("0x{}", digits.to_ascii_lowercase()))
}

// ─── Tests ────────────────────────────────────────────────────────────────────
