//! Configuration for a single ledger run.
//!
//! The built-in defaults are the pool endpoint, wallet address and peer
//! table the ledger was set up with. A `chronolog.toml` in the working
//! directory replaces them wholesale; there are no CLI flags and no
//! environment overrides. The resulting `AppConfig` is immutable and is
//! passed into the run by reference.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::types::ChronologError;

/// Default config file looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chronolog.toml";

const DEFAULT_BASE_URL: &str = "https://api.ethermine.org/miner";
const DEFAULT_MINER: &str = "BC1ADb062Fe69fe08f4722809C7B64198f831097";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 10;

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct AppConfig {
    pub api: ApiConfig,
    pub peers: Vec<PeerConfig>,
    #[serde(default)]
    pub accounting: AccountingConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct ApiConfig {
    /// Pool API base, without the trailing slash.
    pub base_url: String,
    /// Shared payout wallet address.
    pub miner: String,
    /// Cap on the three account-level requests.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// Worker-history requests have no cap unless this is set.
    #[serde(default)]
    pub worker_request_timeout_secs: Option<u64>,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct PeerConfig {
    pub name: String,
    pub workers: Vec<String>,
}

/// Which `data[0]` field of a worker history counts as this hour's rate.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum HashrateSource {
    /// `currentHashrate`. The pool's average covers the worker's whole
    /// history rather than the last hour.
    #[default]
    Current,
    /// `averageHashrate`.
    Average,
}

impl HashrateSource {
    /// JSON field name in the worker-history response.
    pub fn field(&self) -> &'static str {
        match self {
            HashrateSource::Current => "currentHashrate",
            HashrateSource::Average => "averageHashrate",
        }
    }
}

/// What happens to the current hour when a new payout is seen.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ResetPolicy {
    /// Zero everything and stop; the hour is not credited to anyone.
    #[default]
    ResetOnly,
    /// Zero everything, then credit the hour as cycle 1 of the new period.
    ResetThenAccumulate,
}

#[derive(Debug, Deserialize, Clone, PartialEq, Default)]
pub struct AccountingConfig {
    #[serde(default)]
    pub hashrate_source: HashrateSource,
    #[serde(default)]
    pub reset_policy: ResetPolicy,
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct StorageConfig {
    #[serde(default = "default_state_file")]
    pub state_file: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: String,
    #[serde(default = "default_payouts_dir")]
    pub payouts_dir: String,
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT_SECS
}

fn default_state_file() -> String {
    "db.json".to_string()
}

fn default_log_dir() -> String {
    "logs".to_string()
}

fn default_payouts_dir() -> String {
    "payouts".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_file: default_state_file(),
            log_dir: default_log_dir(),
            payouts_dir: default_payouts_dir(),
        }
    }
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            miner: DEFAULT_MINER.to_string(),
            request_timeout_secs: DEFAULT_REQUEST_TIMEOUT_SECS,
            worker_request_timeout_secs: None,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        let peer = |name: &str, workers: &[&str]| PeerConfig {
            name: name.to_string(),
            workers: workers.iter().map(|w| w.to_string()).collect(),
        };

        Self {
            api: ApiConfig::default(),
            peers: vec![
                peer("Ryan", &["kleiner", "43465a"]),
                peer("Matthew", &["pc"]),
                peer("Sam", &["sam"]),
            ],
            accounting: AccountingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl ApiConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn worker_request_timeout(&self) -> Option<Duration> {
        self.worker_request_timeout_secs.map(Duration::from_secs)
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        let config: AppConfig = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {path}"))?;
        config.validate()?;
        Ok(config)
    }

    /// Load `path` if it exists, otherwise use the built-in defaults.
    pub fn load_or_default(path: &str) -> Result<Self> {
        if Path::new(path).exists() {
            Self::load(path)
        } else {
            let config = Self::default();
            config.validate()?;
            Ok(config)
        }
    }

    /// Reject tables that would make a run meaningless.
    pub fn validate(&self) -> Result<(), ChronologError> {
        if self.api.miner.trim().is_empty() {
            return Err(ChronologError::Config("api.miner is empty".into()));
        }
        if self.api.request_timeout_secs == 0 {
            return Err(ChronologError::Config(
                "api.request_timeout_secs must be positive".into(),
            ));
        }
        if self.peers.is_empty() {
            return Err(ChronologError::Config("no peers configured".into()));
        }

        let mut seen = HashSet::new();
        for peer in &self.peers {
            if peer.workers.is_empty() {
                return Err(ChronologError::Config(format!(
                    "peer '{}' has no workers",
                    peer.name
                )));
            }
            if !seen.insert(peer.name.as_str()) {
                return Err(ChronologError::Config(format!(
                    "duplicate peer name '{}'",
                    peer.name
                )));
            }
        }
        Ok(())
    }

    /// Number of worker-history requests one accumulation cycle issues.
    pub fn worker_count(&self) -> usize {
        self.peers.iter().map(|p| p.workers.len()).sum()
    }
}
