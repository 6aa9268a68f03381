//! HTTP transport to the listing provider.
//!
//! The gateway only ever needs "GET this path with these query params and
//! tell me the status and body", so that is the whole trait. The RapidAPI
//! implementation adds the host/key headers; tests substitute fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use super::params::RequestParams;
use crate::config::ProviderConfig;

/// Status and body of an HTTP response, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A single GET round trip.
///
/// `Err` means no HTTP response was obtained at all (DNS, connect,
/// timeout, body read); any response, successful or not, is `Ok`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, path: &str, params: &RequestParams) -> Result<HttpReply>;
}

/// Zillow-on-RapidAPI transport.
pub struct RapidApiTransport {
    http: Client,
    base_url: String,
    host: String,
    api_key: SecretString,
}

impl RapidApiTransport {
    pub fn new(config: &ProviderConfig, api_key: SecretString) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_secs))
            .user_agent("ARV-SCOUT/0.1.0 (listing-screener)")
            .build()
            .context("Failed to build HTTP client for the listing provider")?;

        Ok(Self {
            http,
            base_url: config.base_url(),
            host: config.host.clone(),
            api_key,
        })
    }

    /// Build a transport with the key read from the configured env var.
    pub fn from_env(config: &ProviderConfig) -> Result<Self> {
        let key = crate::config::AppConfig::resolve_env(&config.api_key_env)?;
        Self::new(config, SecretString::new(key))
    }
}

#[async_trait]
impl Transport for RapidApiTransport {
    async fn get(&self, path: &str, params: &RequestParams) -> Result<HttpReply> {
        let url = format!("{}{}", self.base_url, path);
        let query: Vec<(&str, &str)> = params.iter().collect();

        debug!(url = %url, params = query.len(), "Provider request");

        let resp = self
            .http
            .get(&url)
            .header("x-rapidapi-host", self.host.as_str())
            .header("x-rapidapi-key", self.api_key.expose_secret().as_str())
            .query(&query)
            .send()
            .await
            .with_context(|| format!("Provider request to {path} failed"))?;

        let status = resp.status().as_u16();
        let body = resp
            .text()
            .await
            .with_context(|| format!("Failed to read provider response from {path}"))?;

        Ok(HttpReply { status, body })
    }
}
