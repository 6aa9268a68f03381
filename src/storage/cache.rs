//! Raw provider response cache on SQLite.
//!
//! Entries are keyed by (entity id, endpoint, parameter fingerprint) and
//! never expire: the cache is an idempotent memo of successful fetches,
//! overwritten only by a fresh successful fetch of the same key.

use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::str::FromStr;
use tracing::{debug, info};

use crate::provider::params::RequestParams;
use crate::types::ScoutError;

const CREATE_RAW_RESPONSES: &str = "
    CREATE TABLE IF NOT EXISTS raw_responses (
        entity_id   TEXT NOT NULL,
        endpoint    TEXT NOT NULL,
        fingerprint TEXT NOT NULL,
        payload     TEXT NOT NULL,
        fetched_at  TEXT NOT NULL,
        PRIMARY KEY (entity_id, endpoint, fingerprint)
    )";

const CREATE_RATE_LIMITS: &str = "
    CREATE TABLE IF NOT EXISTS rate_limits (
        day   TEXT PRIMARY KEY,
        count INTEGER NOT NULL
    )";

/// Primary key of a cached response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub entity_id: String,
    pub endpoint: String,
    pub fingerprint: String,
}

impl CacheKey {
    pub fn new(entity_id: &str, endpoint: &str, params: &RequestParams) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            endpoint: endpoint.to_string(),
            fingerprint: params.fingerprint(),
        }
    }
}

/// A cached raw payload.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub payload: String,
    pub fetched_at: DateTime<Utc>,
}

pub struct CacheStore {
    pool: SqlitePool,
}

impl CacheStore {
    /// Open (creating if needed) the cache database at `path`.
    pub async fn open(path: &str) -> Result<Self, ScoutError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let store = Self::connect(options).await?;
        info!(path, entries = store.len().await?, "Response cache opened");
        Ok(store)
    }

    /// A cache that lives only as long as this process.
    pub async fn in_memory() -> Result<Self, ScoutError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;
        Self::connect(options).await
    }

    async fn connect(options: SqliteConnectOptions) -> Result<Self, ScoutError> {
        // One long-lived connection: an in-memory database disappears with it.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        sqlx::query(CREATE_RAW_RESPONSES).execute(&pool).await?;
        sqlx::query(CREATE_RATE_LIMITS).execute(&pool).await?;

        Ok(Self { pool })
    }

    /// Look up a cached payload. Never mutates the store.
    pub async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>, ScoutError> {
        let row: Option<(String, String)> = sqlx::query_as(
            "SELECT payload, fetched_at FROM raw_responses
             WHERE entity_id = ? AND endpoint = ? AND fingerprint = ?",
        )
        .bind(&key.entity_id)
        .bind(&key.endpoint)
        .bind(&key.fingerprint)
        .fetch_optional(&self.pool)
        .await?;

        let Some((payload, fetched_at)) = row else {
            return Ok(None);
        };
        let fetched_at = DateTime::parse_from_rfc3339(&fetched_at)
            .map_err(|e| ScoutError::Storage(format!("corrupt fetched_at '{fetched_at}': {e}")))?
            .with_timezone(&Utc);

        Ok(Some(CacheEntry {
            payload,
            fetched_at,
        }))
    }

    /// Store a payload, replacing any previous entry for the same key.
    pub async fn put(&self, key: &CacheKey, payload: &str) -> Result<(), ScoutError> {
        sqlx::query(
            "INSERT INTO raw_responses (entity_id, endpoint, fingerprint, payload, fetched_at)
             VALUES (?, ?, ?, ?, ?)
             ON CONFLICT (entity_id, endpoint, fingerprint)
             DO UPDATE SET payload = excluded.payload, fetched_at = excluded.fetched_at",
        )
        .bind(&key.entity_id)
        .bind(&key.endpoint)
        .bind(&key.fingerprint)
        .bind(payload)
        .bind(Utc::now().to_rfc3339())
        .execute(&self.pool)
        .await?;

        debug!(
            entity_id = %key.entity_id,
            endpoint = %key.endpoint,
            bytes = payload.len(),
            "Response cached"
        );
        Ok(())
    }

    /// Number of cached responses.
    pub async fn len(&self) -> Result<u64, ScoutError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM raw_responses")
            .fetch_one(&self.pool)
            .await?;
        Ok(count.max(0) as u64)
    }

    pub async fn is_empty(&self) -> Result<bool, ScoutError> {
        Ok(self.len().await? == 0)
    }

    /// Drop every cached response. The call ledger is kept: clearing the
    /// cache must not hand back quota already spent today.
    pub async fn clear(&self) -> Result<u64, ScoutError> {
        let result = sqlx::query("DELETE FROM raw_responses")
            .execute(&self.pool)
            .await?;
        info!(removed = result.rows_affected(), "Response cache cleared");
        Ok(result.rows_affected())
    }

    // -- Call ledger -----------------------------------------------------

    /// Outbound calls recorded for `day`.
    pub async fn calls_on(&self, day: NaiveDate) -> Result<u32, ScoutError> {
        let count: Option<i64> = sqlx::query_scalar("SELECT count FROM rate_limits WHERE day = ?")
            .bind(day.to_string())
            .fetch_optional(&self.pool)
            .await?;
        Ok(count.unwrap_or(0).clamp(0, u32::MAX as i64) as u32)
    }

    /// Persist the call counter for `day`.
    pub async fn record_calls(&self, day: NaiveDate, count: u32) -> Result<(), ScoutError> {
        sqlx::query(
            "INSERT INTO rate_limits (day, count) VALUES (?, ?)
             ON CONFLICT (day) DO UPDATE SET count = excluded.count",
        )
        .bind(day.to_string())
        .bind(count as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
