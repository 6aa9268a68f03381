//! ARV-SCOUT: listing screener with after-repair-value estimates
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod engine;
pub mod provider;
pub mod storage;
pub mod types;
pub mod valuation;
