//! Hourly raw-statistics log.
//!
//! Each run appends the miner history and worker list it fetched to
//! `<log_dir>/<YY-MM-DD> : <HH>.log`, named by local time. Runs that land
//! in the same hour share a file.

use anyhow::{Context, Result};
use chrono::{DateTime, TimeZone};
use std::fmt::Display;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::info;

use super::to_pretty_json;
use crate::types::PoolSnapshot;

/// `YY-MM-DD : HH`, used as both the file stem and the entry header.
pub fn hour_stamp<Tz: TimeZone>(now: &DateTime<Tz>) -> String
where
    Tz::Offset: Display,
{
    now.format("%y-%m-%d : %H").to_string()
}

/// Log file for the hour containing `now`.
pub fn log_path<Tz: TimeZone>(dir: &str, now: &DateTime<Tz>) -> PathBuf
where
    Tz::Offset: Display,
{
    Path::new(dir).join(format!("{}.log", hour_stamp(now)))
}

/// Render one log entry.
pub fn render_entry(stamp: &str, snapshot: &PoolSnapshot) -> Result<String> {
    let miner = to_pretty_json(&snapshot.miner_history)?;
    let workers = to_pretty_json(&snapshot.workers)?;
    Ok(format!(
        "{stamp}\nMINER STATS\n\n{miner}\n\nWORKER STATS\n\n{workers}\n"
    ))
}

/// Append this run's snapshot to the hour's log file, creating it if needed.
pub fn append_snapshot<Tz: TimeZone>(
    dir: &str,
    now: &DateTime<Tz>,
    snapshot: &PoolSnapshot,
) -> Result<PathBuf>
where
    Tz::Offset: Display,
{
    let path = log_path(dir, now);
    let entry = render_entry(&hour_stamp(now), snapshot)?;

    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("Failed to open log file {}", path.display()))?;
    file.write_all(entry.as_bytes())
        .with_context(|| format!("Failed to append to log file {}", path.display()))?;

    info!(path = %path.display(), bytes = entry.len(), "Snapshot logged");
    Ok(path)
}
