//! Ethermine public statistics API.
//!
//! API docs: https://api.ethermine.org/docs/
//! Base URL: https://api.ethermine.org/miner/
//! Auth: None required.
//!
//! Requests are plain GETs issued one at a time. The three account-level
//! requests carry the configured timeout; worker-history requests carry
//! none unless one is configured. Nothing is retried.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use super::PoolApi;
use crate::config::ApiConfig;
use crate::types::ChronologError;

const POOL_NAME: &str = "ethermine";

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Ethermine statistics client bound to one wallet address.
pub struct EthermineClient {
    http: Client,
    base_url: String,
    miner: String,
    request_timeout: Duration,
    worker_request_timeout: Option<Duration>,
}

impl EthermineClient {
    /// Create a client from the `[api]` configuration section.
    pub fn new(cfg: &ApiConfig) -> Result<Self> {
        let http = Client::builder()
            .user_agent("CHRONOLOG/0.1.0 (hashrate-ledger)")
            .build()
            .context("Failed to build HTTP client for Ethermine")?;

        Ok(Self {
            http,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            miner: cfg.miner.clone(),
            request_timeout: cfg.request_timeout(),
            worker_request_timeout: cfg.worker_request_timeout(),
        })
    }

    // -- Internal helpers ------------------------------------------------

    /// `<base>/<miner><path>`
    fn url(&self, path: &str) -> String {
        format!("{}/{}{path}", self.base_url, self.miner)
    }

    /// GET a JSON document, failing on transport errors, non-success status
    /// or an unparseable body.
    async fn get_json(&self, path: &str, timeout: Option<Duration>) -> Result<Value> {
        let url = self.url(path);
        debug!(url = %url, timeout = ?timeout, "Fetching pool statistics");

        let mut req = self.http.get(&url);
        if let Some(t) = timeout {
            req = req.timeout(t);
        }

        let resp = req
            .send()
            .await
            .with_context(|| format!("Ethermine request failed: {path}"))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let body = resp.text().await.unwrap_or_default();
            return Err(ChronologError::Api {
                endpoint: path.to_string(),
                message: format!("{status}: {body}"),
            }
            .into());
        }

        let value: Value = resp
            .json()
            .await
            .with_context(|| format!("Failed to parse Ethermine response: {path}"))?;

        Ok(value)
    }
}

// ---------------------------------------------------------------------------
// PoolApi trait implementation
// ---------------------------------------------------------------------------

#[async_trait]
impl PoolApi for EthermineClient {
    async fn miner_history(&self) -> Result<Value> {
        self.get_json("/history", Some(self.request_timeout)).await
    }

    async fn workers(&self) -> Result<Value> {
        self.get_json("/workers", Some(self.request_timeout)).await
    }

    async fn payouts(&self) -> Result<Value> {
        self.get_json("/payouts", Some(self.request_timeout)).await
    }

    async fn worker_history(&self, worker: &str) -> Result<Value> {
        let path = format!("/worker/{}/history", urlencoding::encode(worker));
        self.get_json(&path, self.worker_request_timeout).await
    }

    fn name(&self) -> &str {
        POOL_NAME
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
