//! CHRONOLOG: per-peer hash-rate ledger
//!
//! Entry point. Meant to be run once an hour by cron: loads configuration,
//! initialises structured logging, runs a single ledger cycle against the
//! pool, prints the updated state, and exits. Any failure ends the run with
//! a non-zero exit code; nothing is retried.

use anyhow::Result;
use chrono::Local;
use tracing::info;

use chronolog::config::{self, AppConfig};
use chronolog::engine::cycle::{run_cycle, CycleReport};
use chronolog::pool::ethermine::EthermineClient;
use chronolog::storage;

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    init_logging();

    let cfg = AppConfig::load_or_default(config::DEFAULT_CONFIG_FILE)?;
    info!(
        miner = %cfg.api.miner,
        peers = cfg.peers.len(),
        workers = cfg.worker_count(),
        hashrate_source = ?cfg.accounting.hashrate_source,
        reset_policy = ?cfg.accounting.reset_policy,
        "CHRONOLOG starting"
    );

    let pool = EthermineClient::new(&cfg.api)?;
    let report = run_cycle(&pool, &cfg, Local::now()).await?;
    log_cycle_report(&report);

    println!("{}", storage::to_pretty_json(&report.state)?);
    Ok(())
}

/// Log a human-readable run summary.
fn log_cycle_report(report: &CycleReport) {
    info!(
        outcome = ?report.outcome,
        nonce = report.state.nonce,
        last_payout = ?report.state.last_payout,
        peers_sampled = report.samples.len(),
        log = %report.log_path.display(),
        summary = ?report.summary_path,
        "Run finished"
    );
}

/// Initialise the `tracing` subscriber.
///
/// Logs go to stderr; stdout carries only the state dump.
fn init_logging() {
    use tracing_subscriber::{fmt, EnvFilter};

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("chronolog=info"));

    let json_logging = std::env::var("CHRONOLOG_LOG_JSON").is_ok();

    if json_logging {
        fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        fmt()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    }
}
