//! Hash-rate aggregator.
//!
//! Samples every configured worker once, sums the samples per peer, and
//! folds the per-peer totals into the accumulator state as one hour of
//! work.

use anyhow::{Context, Result};
use std::collections::HashSet;
use tracing::{debug, info, warn};

use crate::config::{HashrateSource, PeerConfig};
use crate::pool::{worker_hashrate, PoolApi};
use crate::types::{AccumulatorState, PeerAccumulator, HASHES_PER_MEGAHASH};

/// One peer's contribution for this cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct PeerSample {
    pub peer: String,
    /// Sum of the peer's workers, in H/s.
    pub raw_hashrate: f64,
}

impl PeerSample {
    /// The sample held for one hour, in MH·h.
    pub fn mega_hash_hours(&self) -> f64 {
        self.raw_hashrate / HASHES_PER_MEGAHASH
    }
}

pub struct HashrateAggregator;

impl HashrateAggregator {
    /// Give every configured peer an accumulator, zeroed if it is new.
    /// Peers present in the state but no longer configured are kept.
    pub fn register_peers(state: &mut AccumulatorState, peers: &[PeerConfig]) {
        for peer in peers {
            if !state.peers.contains_key(&peer.name) {
                warn!(peer = %peer.name, "Configured peer missing from state, starting at zero");
                state.peers.insert(peer.name.clone(), PeerAccumulator::default());
            }
        }
    }

    /// Fetch each worker's history in turn and sum per peer.
    ///
    /// Requests are strictly sequential; the first failure aborts.
    pub async fn sample(
        pool: &dyn PoolApi,
        peers: &[PeerConfig],
        source: HashrateSource,
    ) -> Result<Vec<PeerSample>> {
        let mut samples = Vec::with_capacity(peers.len());

        for peer in peers {
            let mut total = 0.0;
            for worker in &peer.workers {
                let history = pool.worker_history(worker).await?;
                let rate = worker_hashrate(&history, worker, source)
                    .with_context(|| format!("Unusable history for worker {worker} of {}", peer.name))?;
                debug!(peer = %peer.name, worker = %worker, hashrate = rate, "Worker sampled");
                total += rate;
            }
            samples.push(PeerSample {
                peer: peer.name.clone(),
                raw_hashrate: total,
            });
        }

        Ok(samples)
    }

    /// Count one cycle and fold every sample into its peer's totals.
    ///
    /// Peers without a sample (no longer configured) are credited zero, so
    /// every average stays `cumulative / nonce`.
    pub fn fold(state: &mut AccumulatorState, samples: &[PeerSample]) {
        state.nonce += 1;
        let nonce = state.nonce;
        let sampled: HashSet<&str> = samples.iter().map(|s| s.peer.as_str()).collect();

        for sample in samples {
            let acc = state.peers.entry(sample.peer.clone()).or_default();
            acc.fold(sample.mega_hash_hours(), nonce);
            info!(
                peer = %sample.peer,
                mhs = format!("{:.3}", sample.mega_hash_hours()),
                cumulative_mhh = format!("{:.3}", acc.cumulative_mega_hash_hours),
                average_mhs = format!("{:.3}", acc.average_hash_rate_this_payout_period),
                "Peer credited"
            );
        }

        for (name, acc) in state.peers.iter_mut() {
            if !sampled.contains(name.as_str()) {
                acc.fold(0.0, nonce);
                debug!(peer = %name, "Unsampled peer, average recomputed");
            }
        }
    }
}
