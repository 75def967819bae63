//! Payout-cycle detector.
//!
//! Compares the newest payout the pool reports with the one recorded in the
//! state. A difference means the pool paid the shared wallet since the last
//! run and the accumulators belong to a closed period.

use tracing::info;

use crate::pool::LatestPayout;
use crate::types::{AccumulatorState, PayoutId};

/// Outcome of comparing the pool's newest payout with the stored one.
#[derive(Debug, Clone, PartialEq)]
pub enum PayoutCheck {
    /// Same payout as last run; accumulate normally.
    Unchanged,
    /// The pool has never paid this wallet; accumulate normally.
    NoPayoutHistory,
    /// A payout the state has not seen yet. `previous` opened the period
    /// that `latest` closes; `None` when the state never saw a payout.
    NewPayout {
        previous: Option<PayoutId>,
        latest: LatestPayout,
    },
}

pub struct PayoutDetector;

impl PayoutDetector {
    pub fn check(state: &AccumulatorState, latest: Option<LatestPayout>) -> PayoutCheck {
        let Some(latest) = latest else {
            return PayoutCheck::NoPayoutHistory;
        };

        if state.last_payout.as_ref() == Some(&latest.id) {
            return PayoutCheck::Unchanged;
        }

        info!(
            previous = ?state.last_payout,
            latest = %latest.id,
            amount = ?latest.amount,
            "New payout detected"
        );
        PayoutCheck::NewPayout {
            previous: state.last_payout.clone(),
            latest,
        }
    }
}
