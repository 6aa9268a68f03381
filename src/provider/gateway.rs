//! Cached, budgeted, retrying gateway for provider calls.
//!
//! Every logical provider call goes through `RetryingGateway::call`:
//!
//! 1. cache hit → decode and return; no budget, no network;
//! 2. cache miss → one budget admission (denial is fatal);
//! 3. GET with bounded exponential backoff on transport errors, 429, 5xx;
//! 4. decode the 2xx body (failure is fatal);
//! 5. cache the raw body, then return the decoded value.

use tracing::{debug, info, warn};

use super::budget::RateBudget;
use super::params::RequestParams;
use super::retry::{AttemptOutcome, RetryPolicy};
use super::transport::Transport;
use crate::storage::{CacheKey, CacheStore};
use crate::types::ScoutError;

/// Longest slice of an error body kept in error messages.
const MAX_ERROR_BODY: usize = 300;

/// One logical provider call.
#[derive(Debug, Clone)]
pub struct ProviderRequest {
    /// Cache partition: the property id, or the geography for searches.
    pub entity_id: String,
    /// Logical endpoint name, part of the cache key.
    pub endpoint: &'static str,
    /// URL path on the provider.
    pub path: &'static str,
    pub params: RequestParams,
}

pub struct RetryingGateway<T: Transport> {
    transport: T,
    cache: CacheStore,
    budget: RateBudget,
    retry: RetryPolicy,
    cache_hits: u64,
    calls_admitted: u32,
    network_calls: u64,
}

impl<T: Transport> RetryingGateway<T> {
    pub fn new(transport: T, cache: CacheStore, budget: RateBudget, retry: RetryPolicy) -> Self {
        Self {
            transport,
            cache,
            budget,
            retry,
            cache_hits: 0,
            calls_admitted: 0,
            network_calls: 0,
        }
    }

    /// Perform `request`, decoding the body with `decode`.
    pub async fn call<R, F>(&mut self, request: &ProviderRequest, decode: F) -> Result<R, ScoutError>
    where
        F: Fn(&str) -> Result<R, ScoutError>,
    {
        let key = CacheKey::new(&request.entity_id, request.endpoint, &request.params);

        if let Some(entry) = self.cache.get(&key).await? {
            self.cache_hits += 1;
            debug!(
                endpoint = request.endpoint,
                entity_id = %request.entity_id,
                fetched_at = %entry.fetched_at,
                "Cache hit"
            );
            return decode(&entry.payload);
        }

        let permit = self.budget.admit().map_err(|d| ScoutError::BudgetExhausted {
            day: d.day,
            used: d.used,
            limit: d.limit,
        })?;
        self.calls_admitted += 1;
        self.cache.record_calls(permit.day, permit.sequence).await?;

        let body = self.fetch(request).await?;
        let value = decode(&body)?;
        self.cache.put(&key, &body).await?;

        info!(
            endpoint = request.endpoint,
            entity_id = %request.entity_id,
            calls_today = permit.sequence,
            limit = self.budget.daily_limit(),
            "Used endpoint"
        );
        Ok(value)
    }

    /// GET with retries. Returns the body of the first 2xx response.
    async fn fetch(&mut self, request: &ProviderRequest) -> Result<String, ScoutError> {
        let mut attempt: u32 = 0;
        loop {
            attempt += 1;
            self.network_calls += 1;

            let (outcome, message) = match self.transport.get(request.path, &request.params).await {
                Ok(reply) if reply.is_success() => return Ok(reply.body),
                Ok(reply) if reply.status == 403 || reply.status == 404 => {
                    return Err(ScoutError::EndpointUnsupported {
                        endpoint: request.endpoint.to_string(),
                        status: reply.status,
                    });
                }
                Ok(reply) => (
                    AttemptOutcome::Status(reply.status),
                    format!("HTTP {}: {}", reply.status, truncate(&reply.body)),
                ),
                Err(e) => (
                    AttemptOutcome::Transport(e.to_string()),
                    format!("request error: {e:#}"),
                ),
            };

            if !self.retry.should_retry(attempt, &outcome) {
                return Err(ScoutError::UpstreamUnavailable {
                    endpoint: request.endpoint.to_string(),
                    attempts: attempt,
                    message,
                });
            }

            let delay = self.retry.delay_for(attempt);
            warn!(
                endpoint = request.endpoint,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %message,
                "Retryable provider error"
            );
            tokio::time::sleep(delay).await;
        }
    }

    pub fn budget(&self) -> &RateBudget {
        &self.budget
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn cache_hits(&self) -> u64 {
        self.cache_hits
    }

    /// Budget admissions made through this gateway.
    pub fn calls_admitted(&self) -> u32 {
        self.calls_admitted
    }

    /// HTTP round trips attempted, retries included.
    pub fn network_calls(&self) -> u64 {
        self.network_calls
    }
}

fn truncate(body: &str) -> &str {
    match body.char_indices().nth(MAX_ERROR_BODY) {
        Some((idx, _)) => &body[..idx],
        None => body,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
