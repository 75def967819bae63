//! End-to-end ledger runs against the mock pool and a scratch directory.

use chrono::{DateTime, Local, TimeZone};
use serde_json::{json, Value};
use std::path::Path;

use chronolog::config::{
    AccountingConfig, ApiConfig, AppConfig, HashrateSource, PeerConfig, ResetPolicy,
    StorageConfig,
};
use chronolog::engine::cycle::{run_cycle, CycleOutcome};
use chronolog::storage::{self, lock::StateLock};
use chronolog::types::{AccumulatorState, ChronologError, PayoutId, PeerAccumulator};

use crate::mock_pool::MockPool;

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

struct Scratch {
    root: String,
}

impl Scratch {
    fn new() -> Self {
        let mut p = std::env::temp_dir();
        p.push(format!("chronolog_it_{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&p).unwrap();
        Self { root: p.to_string_lossy().to_string() }
    }

    fn path(&self, name: &str) -> String {
        format!("{}/{name}", self.root)
    }

    fn config(&self, peers: Vec<PeerConfig>, policy: ResetPolicy, source: HashrateSource) -> AppConfig {
        AppConfig {
            api: ApiConfig {
                base_url: "http://unused.invalid/miner".into(),
                miner: "abc123".into(),
                request_timeout_secs: 10,
                worker_request_timeout_secs: None,
            },
            peers,
            accounting: AccountingConfig {
                hashrate_source: source,
                reset_policy: policy,
            },
            storage: StorageConfig {
                state_file: self.path("db.json"),
                log_dir: self.path("logs"),
                payouts_dir: self.path("payouts"),
            },
        }
    }

    fn read_state(&self) -> AccumulatorState {
        storage::load_state(Some(&self.path("db.json"))).unwrap().unwrap()
    }

    fn write_state(&self, state: &AccumulatorState) {
        storage::save_state(state, Some(&self.path("db.json"))).unwrap();
    }
}

impl Drop for Scratch {
    fn drop(&mut self) {
        let _ = std::fs::remove_dir_all(&self.root);
    }
}

fn peer(name: &str, workers: &[&str]) -> PeerConfig {
    PeerConfig {
        name: name.into(),
        workers: workers.iter().map(|w| w.to_string()).collect(),
    }
}

/// `{lastPayout: "T0", nonce: 5, peers: {A: {cumulative: 10, average: 2}}}`
fn stored_t0() -> AccumulatorState {
    let mut state = AccumulatorState::new();
    state.last_payout = Some("T0".into());
    state.nonce = 5;
    state.peers.insert(
        "A".into(),
        PeerAccumulator {
            cumulative_mega_hash_hours: 10.0,
            average_hash_rate_this_payout_period: 2.0,
        },
    );
    state
}

fn at(hour: u32, minute: u32) -> DateTime<Local> {
    Local.with_ymd_and_hms(2024, 1, 1, hour, minute, 0).unwrap()
}

fn close(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ---------------------------------------------------------------------------
// Accumulation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_unchanged_payout_accumulates() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 3_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Accumulated);
    let state = dir.read_state();
    assert_eq!(state.nonce, 6);
    assert_eq!(state.last_payout, Some(PayoutId::from("T0")));
    let a = state.peers["A"];
    assert!(close(a.cumulative_mega_hash_hours, 13.0));
    assert!(close(a.average_hash_rate_this_payout_period, 13.0 / 6.0));
    assert_eq!(report.state, state);
}

#[tokio::test]
async fn test_one_megahash_hour_lands_on_eleven() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 1_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    let a = dir.read_state().peers["A"];
    assert!(close(a.cumulative_mega_hash_hours, 11.0));
    assert!(close(a.average_hash_rate_this_payout_period, 11.0 / 6.0));
}

#[tokio::test]
async fn test_workers_summed_per_peer() {
    let dir = Scratch::new();
    let pool = MockPool::new(json!(1_700_000_000));
    pool.set_rate("kleiner", 2_000_000.0, 0.0);
    pool.set_rate("43465a", 500_000.0, 0.0);
    pool.set_rate("pc", 1_000_000.0, 0.0);
    let cfg = dir.config(
        vec![peer("Ryan", &["kleiner", "43465a"]), peer("Matthew", &["pc"])],
        ResetPolicy::ResetOnly,
        HashrateSource::Current,
    );
    let mut stored = AccumulatorState::new();
    stored.last_payout = Some(PayoutId::Timestamp(1_700_000_000));
    dir.write_state(&stored);

    let report = run_cycle(&pool, &cfg, at(10, 0)).await.unwrap();

    assert_eq!(report.samples.len(), 2);
    let state = dir.read_state();
    assert_eq!(state.nonce, 1);
    assert!(close(state.peers["Ryan"].cumulative_mega_hash_hours, 2.5));
    assert!(close(state.peers["Matthew"].cumulative_mega_hash_hours, 1.0));
}

#[tokio::test]
async fn test_average_hashrate_source() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 9_000_000.0, 2_000_000.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Average);

    run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert!(close(dir.read_state().peers["A"].cumulative_mega_hash_hours, 12.0));
}

#[tokio::test]
async fn test_unconfigured_peer_average_follows_nonce() {
    let dir = Scratch::new();
    let mut stored = stored_t0();
    stored.peers.insert(
        "Gone".into(),
        PeerAccumulator {
            cumulative_mega_hash_hours: 10.0,
            average_hash_rate_this_payout_period: 2.0,
        },
    );
    dir.write_state(&stored);
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 1_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    let state = dir.read_state();
    assert_eq!(state.nonce, 6);
    let gone = state.peers["Gone"];
    assert!(close(gone.cumulative_mega_hash_hours, 10.0));
    assert!(close(gone.average_hash_rate_this_payout_period, 10.0 / 6.0));
    assert_eq!(pool.requests().iter().filter(|r| r.contains("Gone")).count(), 0);
}

#[tokio::test]
async fn test_nonce_counts_consecutive_runs() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 4_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    for (i, hour) in (10..13).enumerate() {
        run_cycle(&pool, &cfg, at(hour, 0)).await.unwrap();
        let state = dir.read_state();
        assert_eq!(state.nonce, 6 + i as u64);
        let a = state.peers["A"];
        assert!(close(
            a.average_hash_rate_this_payout_period,
            a.cumulative_mega_hash_hours / state.nonce as f64
        ));
    }
    assert!(close(dir.read_state().peers["A"].cumulative_mega_hash_hours, 22.0));
}

#[tokio::test]
async fn test_fresh_start_without_payout_history() {
    let dir = Scratch::new();
    let pool = MockPool::new(Value::Null);
    pool.set_rate("a1", 5_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Accumulated);
    let state = dir.read_state();
    assert!(state.last_payout.is_none());
    assert_eq!(state.nonce, 1);
    assert!(close(state.peers["A"].average_hash_rate_this_payout_period, 5.0));
}

// ---------------------------------------------------------------------------
// Payout reset
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_new_payout_resets_everything() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T1"));
    pool.set_rate("a1", 3_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Reset);
    let state = dir.read_state();
    assert_eq!(state.nonce, 0);
    assert_eq!(state.last_payout, Some(PayoutId::from("T1")));
    assert_eq!(state.peers["A"], PeerAccumulator::default());
    // the reset hour is not sampled at all
    assert_eq!(pool.worker_requests(), 0);
}

#[tokio::test]
async fn test_new_payout_writes_summary_of_closed_period() {
    let dir = Scratch::new();
    let mut stored = stored_t0();
    stored.peers.insert(
        "B".into(),
        PeerAccumulator {
            cumulative_mega_hash_hours: 30.0,
            average_hash_rate_this_payout_period: 6.0,
        },
    );
    dir.write_state(&stored);
    let pool = MockPool::new(json!("T1"));
    pool.set_rate("a1", 1.0, 0.0);
    pool.set_rate("b1", 1.0, 0.0);
    let cfg = dir.config(
        vec![peer("A", &["a1"]), peer("B", &["b1"])],
        ResetPolicy::ResetOnly,
        HashrateSource::Current,
    );

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    let path = report.summary_path.expect("summary written");
    assert!(path.ends_with("T0.json"));
    let summary: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
    assert_eq!(summary["periodStartPayout"], "T0");
    assert_eq!(summary["payout"], "T1");
    assert_eq!(summary["cycles"], 5);
    assert_eq!(summary["peers"]["A"]["share"], 0.25);
    assert_eq!(summary["peers"]["B"]["share"], 0.75);
    assert_eq!(summary["payoutAmount"], 50_000_000_000_000_000u64);
}

#[tokio::test]
async fn test_slash_payout_label_still_resets() {
    let dir = Scratch::new();
    let mut stored = stored_t0();
    stored.last_payout = Some("2024/01/01".into());
    dir.write_state(&stored);
    let pool = MockPool::new(json!("2024/02/01"));
    pool.set_rate("a1", 1_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Reset);
    let path = report.summary_path.expect("summary written");
    assert_eq!(path.parent().unwrap(), Path::new(&dir.path("payouts")));
    assert!(path.ends_with("2024_01_01.json"));
    let state = dir.read_state();
    assert_eq!(state.last_payout, Some(PayoutId::from("2024/02/01")));
    assert_eq!(state.nonce, 0);

    // the next hour sees the stored label and accumulates
    let report = run_cycle(&pool, &cfg, at(10, 0)).await.unwrap();
    assert_eq!(report.outcome, CycleOutcome::Accumulated);
    assert_eq!(dir.read_state().nonce, 1);
}

#[tokio::test]
async fn test_reset_then_accumulate_policy() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T1"));
    pool.set_rate("a1", 3_000_000.0, 0.0);
    let cfg = dir.config(
        vec![peer("A", &["a1"])],
        ResetPolicy::ResetThenAccumulate,
        HashrateSource::Current,
    );

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::ResetAndAccumulated);
    let state = dir.read_state();
    assert_eq!(state.nonce, 1);
    assert_eq!(state.last_payout, Some(PayoutId::from("T1")));
    assert!(close(state.peers["A"].cumulative_mega_hash_hours, 3.0));
    assert!(close(state.peers["A"].average_hash_rate_this_payout_period, 3.0));
}

#[tokio::test]
async fn test_first_payout_on_fresh_state_has_no_summary() {
    let dir = Scratch::new();
    let pool = MockPool::new(json!(1_650_000_000));
    pool.set_rate("a1", 1.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let report = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(report.outcome, CycleOutcome::Reset);
    assert!(report.summary_path.is_none());
    assert_eq!(dir.read_state().last_payout, Some(PayoutId::Timestamp(1_650_000_000)));
}

// ---------------------------------------------------------------------------
// Failure and locking
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_worker_failure_leaves_state_untouched() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 3_000_000.0, 0.0);
    pool.set_rate("a2", 3_000_000.0, 0.0);
    pool.fail_worker("a2");
    let cfg = dir.config(vec![peer("A", &["a1", "a2"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let err = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap_err();

    assert!(err.to_string().contains("simulated timeout"));
    assert_eq!(dir.read_state(), stored_t0());
    assert!(!StateLock::path_for(&dir.path("db.json")).exists());
    assert!(!Path::new(&dir.path("logs/24-01-01 : 09.log")).exists());
}

#[tokio::test]
async fn test_overlapping_run_is_rejected() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 3_000_000.0, 0.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let held = StateLock::acquire(&cfg.storage.state_file).unwrap();
    let err = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ChronologError>(),
        Some(ChronologError::StateLocked(_))
    ));
    assert_eq!(dir.read_state(), stored_t0());

    drop(held);
    run_cycle(&pool, &cfg, at(9, 5)).await.unwrap();
    assert_eq!(dir.read_state().nonce, 6);
}

#[tokio::test]
async fn test_requests_are_sequential_in_config_order() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    for w in ["x", "y", "z"] {
        pool.set_rate(w, 1.0, 1.0);
    }
    let cfg = dir.config(
        vec![peer("A", &["y", "x"]), peer("B", &["z"])],
        ResetPolicy::ResetOnly,
        HashrateSource::Current,
    );

    run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();

    assert_eq!(
        pool.requests(),
        vec!["history", "workers", "payouts", "worker/y", "worker/x", "worker/z"]
    );
}

// ---------------------------------------------------------------------------
// Hourly log
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_two_runs_same_hour_share_log_file() {
    let dir = Scratch::new();
    dir.write_state(&stored_t0());
    let pool = MockPool::new(json!("T0"));
    pool.set_rate("a1", 1.0, 1.0);
    let cfg = dir.config(vec![peer("A", &["a1"])], ResetPolicy::ResetOnly, HashrateSource::Current);

    let first = run_cycle(&pool, &cfg, at(9, 0)).await.unwrap();
    let second = run_cycle(&pool, &cfg, at(9, 30)).await.unwrap();

    assert_eq!(first.log_path, second.log_path);
    assert!(first.log_path.ends_with("24-01-01 : 09.log"));
    let text = std::fs::read_to_string(&first.log_path).unwrap();
    assert_eq!(text.matches("24-01-01 : 09\nMINER STATS").count(), 2);
    assert_eq!(text.matches("WORKER STATS").count(), 2);
}
