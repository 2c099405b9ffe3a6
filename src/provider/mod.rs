//! HTTP client for the Nodit web3 data API
//!
//! Thin POST wrapper with bounded retries. Only transient failures (5xx, 408,
//! transport errors) are retried; HTTP 429 is classified as a rate limit and
//! returned immediately so the caching layer can start its cooldown instead of
//! hammering the provider, and other 4xx responses fail fast.

pub mod types;

use crate::arguments::is_debug_provider_enabled;
use crate::errors::ProviderError;
use crate::logger::{self, LogTag};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;
use types::{PricesRequest, RawTokenPrice, RawTransfer, TransfersRequest, TransfersResponse};

/// Header carrying the API key on every request
const API_KEY_HEADER: &str = "X-API-KEY";

/// Attempts per request, including the first
const MAX_ATTEMPTS: u32 = 3;

/// Remote source of token transfers and spot prices
///
/// The monitor only talks to this trait, which keeps the pipeline testable
/// with in-memory providers.
#[async_trait]
pub trait TransferProvider: Send + Sync {
    async fn token_transfers(
        &self,
        chain: &str,
        network: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_value: &str,
    ) -> Result<Vec<RawTransfer>, ProviderError>;

    async fn token_prices(
        &self,
        chain: &str,
        network: &str,
        contracts: &[String],
    ) -> Result<Vec<RawTokenPrice>, ProviderError>;
}

// ===== NODIT CLIENT =====

pub struct NoditClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl NoditClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, anyhow::Error> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// POST `body` to `{base}/{chain}/{network}/{path}` with bounded retries
    async fn post<B, R>(
        &self,
        chain: &str,
        network: &str,
        path: &str,
        body: &B,
    ) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        let url = format!("{}/{}/{}/{}", self.base_url, chain, network, path);
        let endpoint = format!("/{}/{}/{}", chain, network, path);

        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(&url, &endpoint, body).await {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < MAX_ATTEMPTS => {
                    let delay = Duration::from_secs(1 << attempt);
                    logger::warning(
                        LogTag::Provider,
                        &format!(
                            "{} attempt {}/{} failed ({}); retrying in {}s",
                            endpoint,
                            attempt,
                            MAX_ATTEMPTS,
                            err,
                            delay.as_secs()
                        ),
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn send_once<B, R>(&self, url: &str, endpoint: &str, body: &B) -> Result<R, ProviderError>
    where
        B: Serialize + Sync,
        R: DeserializeOwned,
    {
        if is_debug_provider_enabled() {
            logger::debug(LogTag::Provider, &format!("POST {}", endpoint));
        }

        let response = self
            .http
            .post(url)
            .header(API_KEY_HEADER, &self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| ProviderError::Transient {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })?;

        let status = response.status();
        if status.as_u16() == 429 {
            return Err(ProviderError::RateLimited {
                endpoint: endpoint.to_string(),
            });
        }
        if status.is_server_error() || status.as_u16() == 408 {
            return Err(ProviderError::Transient {
                endpoint: endpoint.to_string(),
                message: format!("HTTP {}", status.as_u16()),
            });
        }
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ProviderError::Client {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }

        response
            .json::<R>()
            .await
            .map_err(|e| ProviderError::Malformed {
                endpoint: endpoint.to_string(),
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl TransferProvider for NoditClient {
    async fn token_transfers(
        &self,
        chain: &str,
        network: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        min_value: &str,
    ) -> Result<Vec<RawTransfer>, ProviderError> {
        let body = TransfersRequest::new(
            from.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            to.to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
            min_value.to_string(),
        );
        let response: TransfersResponse = self
            .post(chain, network, "token/getTokenTransfersWithinRange", &body)
            .await?;
        let items = response.into_items();
        if is_debug_provider_enabled() {
            logger::debug(
                LogTag::Provider,
                &format!("{}/{}: {} transfers in range", chain, network, items.len()),
            );
        }
        Ok(items)
    }

    async fn token_prices(
        &self,
        chain: &str,
        network: &str,
        contracts: &[String],
    ) -> Result<Vec<RawTokenPrice>, ProviderError> {
        if contracts.is_empty() {
            return Ok(Vec::new());
        }
        let body = PricesRequest::new(contracts.to_vec());
        self.post(chain, network, "token/getTokenPricesByContracts", &body)
            .await
    }
}
