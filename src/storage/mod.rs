//! Persistence layer.
//!
//! A single SQLite file holds the raw provider response cache and the
//! per-day outbound call counter. Nothing else is persisted between runs.

pub mod cache;

pub use cache::{CacheEntry, CacheKey, CacheStore};
