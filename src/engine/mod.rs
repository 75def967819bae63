//! Core engine: payout detection, hash-rate aggregation, and the run cycle
//! that ties them to the pool and the state file.

pub mod aggregator;
pub mod cycle;
pub mod detector;
