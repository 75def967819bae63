//! Mining pool statistics API.
//!
//! Defines the `PoolApi` trait and the ethermine implementation, plus the
//! helpers that pick the few fields the ledger needs out of otherwise
//! untyped responses. Every response carries a top-level `data` array and
//! only `data[0]` is consulted.

pub mod ethermine;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use crate::config::HashrateSource;
use crate::types::{ChronologError, PayoutId, PoolSnapshot};

/// Read-only access to one wallet's statistics on a mining pool.
///
/// Implementors issue exactly one request per call and never retry.
#[async_trait]
pub trait PoolApi: Send + Sync {
    /// `/<address>/history`
    async fn miner_history(&self) -> Result<Value>;

    /// `/<address>/workers`
    async fn workers(&self) -> Result<Value>;

    /// `/<address>/payouts`
    async fn payouts(&self) -> Result<Value>;

    /// `/<address>/worker/<id>/history`
    async fn worker_history(&self, worker: &str) -> Result<Value>;

    /// Pool name for logging.
    fn name(&self) -> &str;
}

/// Fetch the three account-level resources, one after another.
pub async fn fetch_snapshot(pool: &dyn PoolApi) -> Result<PoolSnapshot> {
    let miner_history = pool.miner_history().await?;
    let workers = pool.workers().await?;
    let payouts = pool.payouts().await?;
    debug!(pool = pool.name(), "Account snapshot fetched");

    Ok(PoolSnapshot {
        miner_history,
        workers,
        payouts,
    })
}

/// The newest payout as reported by `/payouts`.
#[derive(Debug, Clone, PartialEq)]
pub struct LatestPayout {
    pub id: PayoutId,
    /// Amount in the pool's base unit, when reported. Kept as the parsed
    /// JSON number: wei amounts exceed what an `f64` holds exactly.
    pub amount: Option<serde_json::Number>,
}

/// `data[0]` of a response, or `None` when `data` is empty.
fn first_entry<'a>(resp: &'a Value, endpoint: &str) -> Result<Option<&'a Value>, ChronologError> {
    let data = resp
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| ChronologError::MissingField {
            endpoint: endpoint.to_string(),
            field: "data".to_string(),
        })?;
    Ok(data.first())
}

/// Newest payout in a `/payouts` response. An account with no payouts yet
/// yields `None`.
pub fn latest_payout(payouts: &Value) -> Result<Option<LatestPayout>, ChronologError> {
    let Some(entry) = first_entry(payouts, "payouts")? else {
        return Ok(None);
    };

    let paid_on = entry.get("paidOn").ok_or_else(|| ChronologError::MissingField {
        endpoint: "payouts".to_string(),
        field: "paidOn".to_string(),
    })?;
    let id: PayoutId = serde_json::from_value(paid_on.clone()).map_err(|e| {
        ChronologError::Api {
            endpoint: "payouts".to_string(),
            message: format!("unusable paidOn {paid_on}: {e}"),
        }
    })?;
    let amount = match entry.get("amount") {
        Some(Value::Number(n)) => Some(n.clone()),
        _ => None,
    };

    Ok(Some(LatestPayout { id, amount }))
}

/// Hash rate (H/s) a worker reported in its newest history entry.
pub fn worker_hashrate(
    history: &Value,
    worker: &str,
    source: HashrateSource,
) -> Result<f64, ChronologError> {
    let endpoint = format!("worker/{worker}/history");
    let entry = first_entry(history, &endpoint)?
        .ok_or_else(|| ChronologError::EmptyData(endpoint.clone()))?;

    entry
        .get(source.field())
        .and_then(Value::as_f64)
        .ok_or_else(|| ChronologError::MissingField {
            endpoint,
            field: source.field().to_string(),
        })
}
