//! CHRONOLOG: per-peer hash-rate ledger for a shared mining payout address
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod pool;
pub mod engine;
pub mod storage;
