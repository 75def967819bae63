//! Payout summaries.
//!
//! When a new payout is detected the period that just closed is written to
//! `<payouts_dir>/<previous payout id>.json` before the accumulators are
//! zeroed. The file is what the peers split the payout by; nothing here
//! moves funds. Payout ids come from the pool, so only `[A-Za-z0-9._-]`
//! survive into the file name.

use anyhow::{Context, Result};
use chrono::{DateTime, Local};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::info;

use super::to_pretty_json;
use crate::types::{AccumulatorState, PayoutId};

/// One peer's standing at the end of a payout period.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PeerShare {
    pub cumulative_mega_hash_hours: f64,
    pub average_hash_rate_this_payout_period: f64,
    /// Fraction of the period's total MH·h, in `[0, 1]`.
    pub share: f64,
}

/// The closed period, as written to disk.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PayoutSummary {
    /// Payout that opened the period.
    pub period_start_payout: PayoutId,
    /// Payout that closed it.
    pub payout: PayoutId,
    /// Amount paid, in the pool's base unit, as the pool reported it.
    pub payout_amount: Option<serde_json::Number>,
    pub cycles: u64,
    pub total_mega_hash_hours: f64,
    pub peers: BTreeMap<String, PeerShare>,
    pub written_at: DateTime<Local>,
}

impl PayoutSummary {
    /// Summarise `state` (still holding the closing period's totals) for
    /// the period opened by `start` and closed by `payout`.
    pub fn from_state(
        state: &AccumulatorState,
        start: &PayoutId,
        payout: &PayoutId,
        payout_amount: Option<serde_json::Number>,
        written_at: DateTime<Local>,
    ) -> Self {
        let total = state.total_mega_hash_hours();

        let peers = state
            .peers
            .iter()
            .map(|(name, acc)| {
                let share = if total > 0.0 {
                    acc.cumulative_mega_hash_hours / total
                } else {
                    0.0
                };
                (
                    name.clone(),
                    PeerShare {
                        cumulative_mega_hash_hours: acc.cumulative_mega_hash_hours,
                        average_hash_rate_this_payout_period: acc
                            .average_hash_rate_this_payout_period,
                        share,
                    },
                )
            })
            .collect();

        Self {
            period_start_payout: start.clone(),
            payout: payout.clone(),
            payout_amount,
            cycles: state.nonce,
            total_mega_hash_hours: total,
            peers,
            written_at,
        }
    }

    /// File stem for a payout id: anything outside `[A-Za-z0-9._-]` becomes
    /// `_`, and a leading `.` is escaped so the stem is never `.`, `..` or
    /// hidden.
    pub fn file_stem(id: &PayoutId) -> String {
        let mut stem: String = id
            .to_string()
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        if stem.is_empty() || stem.starts_with('.') {
            stem.insert(0, '_');
        }
        stem
    }

    /// Target file for this summary, always directly inside `dir`.
    pub fn path_in(&self, dir: &str) -> PathBuf {
        Path::new(dir).join(format!("{}.json", Self::file_stem(&self.period_start_payout)))
    }

    /// Write the summary into `dir`, replacing any earlier copy.
    pub fn write(&self, dir: &str) -> Result<PathBuf> {
        let path = self.path_in(dir);
        let json = to_pretty_json(self).context("Failed to serialise payout summary")?;
        std::fs::write(&path, json)
            .with_context(|| format!("Failed to write payout summary {}", path.display()))?;

        info!(
            path = %path.display(),
            payout = %self.payout,
            cycles = self.cycles,
            total_mhh = format!("{:.3}", self.total_mega_hash_hours),
            "Payout summary written"
        );
        Ok(path)
    }
}
