//! Persistence layer.
//!
//! Saves and loads the accumulator state to/from a JSON file, appends the
//! hourly raw-statistics log, writes payout summaries, and guards the state
//! file against overlapping runs.

pub mod hourly_log;
pub mod lock;
pub mod payout_summary;

use anyhow::{Context, Result};
use serde::Serialize;
use std::path::Path;
use tracing::{debug, info};

use crate::types::AccumulatorState;

/// Default state file path.
const DEFAULT_STATE_FILE: &str = "db.json";

/// Serialise with a four-space indent, the layout of every file the ledger
/// writes.
pub fn to_pretty_json<T: Serialize + ?Sized>(value: &T) -> Result<String> {
    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    value
        .serialize(&mut ser)
        .context("Failed to serialise JSON")?;
    String::from_utf8(buf).context("Serialised JSON is not UTF-8")
}

/// Create `dir` (and parents). An existing directory is fine.
pub fn ensure_dir(dir: &str) -> Result<()> {
    std::fs::create_dir_all(dir).with_context(|| format!("Failed to create directory {dir}"))
}

/// Save accumulator state, replacing the file atomically.
///
/// The document is written to a sibling `.tmp` file first and renamed over
/// the target, so a crash mid-write leaves the previous state intact.
pub fn save_state(state: &AccumulatorState, path: Option<&str>) -> Result<()> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);
    let json = to_pretty_json(state).context("Failed to serialise accumulator state")?;

    let tmp = format!("{path}.tmp");
    std::fs::write(&tmp, &json).with_context(|| format!("Failed to write state to {tmp}"))?;
    std::fs::rename(&tmp, path)
        .with_context(|| format!("Failed to move {tmp} over {path}"))?;

    debug!(path, nonce = state.nonce, "State saved");
    Ok(())
}

/// Load accumulator state from a JSON file.
/// Returns None if the file doesn't exist (fresh start).
pub fn load_state(path: Option<&str>) -> Result<Option<AccumulatorState>> {
    let path = path.unwrap_or(DEFAULT_STATE_FILE);

    if !Path::new(path).exists() {
        info!(path, "No saved state found, starting fresh");
        return Ok(None);
    }

    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read state from {path}"))?;

    let state: AccumulatorState = serde_json::from_str(&json)
        .with_context(|| format!("Failed to parse state from {path}"))?;

    info!(
        path,
        nonce = state.nonce,
        last_payout = ?state.last_payout,
        peers = state.peers.len(),
        "State loaded from disk"
    );

    Ok(Some(state))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
