//! Shared types for CHRONOLOG.
//!
//! The persisted accumulator state, the raw pool snapshot that each run
//! fetches, and the domain error enum. Field names on the persisted types
//! follow the camelCase layout of the `db.json` file the ledger has always
//! used, so existing state files load unchanged.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// Raw hash rates are reported in H/s; accumulators are kept in MH·h.
pub const HASHES_PER_MEGAHASH: f64 = 1_000_000.0;

// ---------------------------------------------------------------------------
// Payout identifier
// ---------------------------------------------------------------------------

/// Identifier of the most recent payout reported by the pool.
///
/// Ethermine reports `paidOn` as a unix timestamp, but hand-edited state
/// files (and other pools) use strings, so both shapes are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PayoutId {
    Timestamp(i64),
    Label(String),
}

impl fmt::Display for PayoutId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PayoutId::Timestamp(ts) => write!(f, "{ts}"),
            PayoutId::Label(label) => write!(f, "{label}"),
        }
    }
}

impl From<i64> for PayoutId {
    fn from(ts: i64) -> Self {
        PayoutId::Timestamp(ts)
    }
}

impl From<&str> for PayoutId {
    fn from(label: &str) -> Self {
        PayoutId::Label(label.to_string())
    }
}

// ---------------------------------------------------------------------------
// Accumulator state
// ---------------------------------------------------------------------------

/// One peer's running totals for the current payout period.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerAccumulator {
    pub cumulative_mega_hash_hours: f64,
    pub average_hash_rate_this_payout_period: f64,
}

impl PeerAccumulator {
    /// Fold one cycle's hash rate (MH/s held for one hour) into the totals.
    ///
    /// `nonce` is the cycle count *including* this cycle.
    pub fn fold(&mut self, mega_hash_hours: f64, nonce: u64) {
        self.cumulative_mega_hash_hours += mega_hash_hours;
        self.average_hash_rate_this_payout_period = if nonce == 0 {
            0.0
        } else {
            self.cumulative_mega_hash_hours / nonce as f64
        };
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything persisted between runs.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AccumulatorState {
    /// Identifier of the last payout observed; `None` until the first run.
    #[serde(default)]
    pub last_payout: Option<PayoutId>,
    /// Accumulation cycles completed since `last_payout`.
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub peers: BTreeMap<String, PeerAccumulator>,
}

impl AccumulatorState {
    /// A state that has never seen a payout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Zero the cycle counter and every peer's totals, and record `payout`.
    pub fn reset_for_payout(&mut self, payout: PayoutId) {
        self.last_payout = Some(payout);
        self.nonce = 0;
        for acc in self.peers.values_mut() {
            acc.reset();
        }
    }

    /// Sum of every peer's cumulative MH·h this period.
    pub fn total_mega_hash_hours(&self) -> f64 {
        self.peers
            .values()
            .map(|p| p.cumulative_mega_hash_hours)
            .sum()
    }
}

impl fmt::Display for AccumulatorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let last = self
            .last_payout
            .as_ref()
            .map(ToString::to_string)
            .unwrap_or_else(|| "never".to_string());
        write!(
            f,
            "[payout {last} | cycle {} | {} peers | {:.2} MH·h]",
            self.nonce,
            self.peers.len(),
            self.total_mega_hash_hours(),
        )
    }
}

// ---------------------------------------------------------------------------
// Pool snapshot
// ---------------------------------------------------------------------------

/// The three account-level responses fetched at the start of every run.
///
/// Kept as untyped JSON: they are only logged, and the payout history is
/// read for its first entry.
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSnapshot {
    pub miner_history: serde_json::Value,
    pub workers: serde_json::Value,
    pub payouts: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error)]
pub enum ChronologError {
    #[error("Pool API error ({endpoint}): {message}")]
    Api { endpoint: String, message: String },

    #[error("Pool API returned no data for {0}")]
    EmptyData(String),

    #[error("Pool API response for {endpoint} is missing `{field}`")]
    MissingField { endpoint: String, field: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("State file is locked by another run: {0}")]
    StateLocked(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
