//! One ledger run, start to finish.
//!
//! fetch snapshot → lock → load state → detect payout → reset and/or
//! accumulate → payout summary → save state → append hourly log.
//!
//! Any failure aborts at that point. State is only written after every
//! request has succeeded, so a failed run leaves the previous state on disk.

use anyhow::Result;
use chrono::{DateTime, Local};
use std::path::PathBuf;
use tracing::info;

use super::aggregator::{HashrateAggregator, PeerSample};
use super::detector::{PayoutCheck, PayoutDetector};
use crate::config::{AppConfig, ResetPolicy};
use crate::pool::{fetch_snapshot, latest_payout, PoolApi};
use crate::storage::{self, hourly_log, lock::StateLock, payout_summary::PayoutSummary};
use crate::types::AccumulatorState;

/// What the run did to the accumulators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Normal hour: nonce advanced, samples folded.
    Accumulated,
    /// New payout: everything zeroed, hour not credited.
    Reset,
    /// New payout: everything zeroed, hour credited as cycle 1.
    ResetAndAccumulated,
}

/// Summary of a completed run.
#[derive(Debug, Clone)]
pub struct CycleReport {
    pub outcome: CycleOutcome,
    pub samples: Vec<PeerSample>,
    pub state: AccumulatorState,
    pub log_path: PathBuf,
    pub summary_path: Option<PathBuf>,
}

/// Run one cycle against `pool` with the given configuration.
///
/// `now` names the hourly log file and stamps any payout summary.
pub async fn run_cycle(
    pool: &dyn PoolApi,
    cfg: &AppConfig,
    now: DateTime<Local>,
) -> Result<CycleReport> {
    storage::ensure_dir(&cfg.storage.payouts_dir)?;
    storage::ensure_dir(&cfg.storage.log_dir)?;

    let snapshot = fetch_snapshot(pool).await?;

    let _lock = StateLock::acquire(&cfg.storage.state_file)?;
    let mut state = storage::load_state(Some(&cfg.storage.state_file))?
        .unwrap_or_else(AccumulatorState::new);
    HashrateAggregator::register_peers(&mut state, &cfg.peers);

    let latest = latest_payout(&snapshot.payouts)?;
    let check = PayoutDetector::check(&state, latest);

    let mut summary_path = None;
    let mut samples = Vec::new();

    let outcome = match check {
        PayoutCheck::NewPayout { previous, latest } => {
            // a state that never saw a payout has no period to close
            if let Some(previous) = &previous {
                let summary = PayoutSummary::from_state(
                    &state,
                    previous,
                    &latest.id,
                    latest.amount.clone(),
                    now,
                );
                summary_path = Some(summary.write(&cfg.storage.payouts_dir)?);
            }
            state.reset_for_payout(latest.id);

            match cfg.accounting.reset_policy {
                ResetPolicy::ResetOnly => CycleOutcome::Reset,
                ResetPolicy::ResetThenAccumulate => {
                    samples = HashrateAggregator::sample(
                        pool,
                        &cfg.peers,
                        cfg.accounting.hashrate_source,
                    )
                    .await?;
                    HashrateAggregator::fold(&mut state, &samples);
                    CycleOutcome::ResetAndAccumulated
                }
            }
        }
        PayoutCheck::Unchanged | PayoutCheck::NoPayoutHistory => {
            samples =
                HashrateAggregator::sample(pool, &cfg.peers, cfg.accounting.hashrate_source)
                    .await?;
            HashrateAggregator::fold(&mut state, &samples);
            CycleOutcome::Accumulated
        }
    };

    storage::save_state(&state, Some(&cfg.storage.state_file))?;
    let log_path = hourly_log::append_snapshot(&cfg.storage.log_dir, &now, &snapshot)?;

    info!(
        outcome = ?outcome,
        state = %state,
        "Cycle complete"
    );

    Ok(CycleReport {
        outcome,
        samples,
        state,
        log_path,
        summary_path,
    })
}
