//! STONKZ: watchlist breakout scanner.
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod chart;
pub mod config;
pub mod dashboard;
pub mod engine;
pub mod market;
pub mod notify;
pub mod signal;
pub mod storage;
pub mod types;
