//! REST poll provider.
//!
//! Two endpoints, both JSON:
//! - `GET {base}/symbols` returns `{"symbols": ["HK.00700", ...]}`
//! - `GET {base}/quotes?symbols=A,B` returns `{"quotes": [{"symbol": "A",
//!   "price": "12.5", "volume": 100, "bids": [...], "asks": [...],
//!   "timestamp": "2024-03-01T01:30:00Z"}]}`
//!
//! Connect failures and timeouts are retried a bounded number of times.

use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use reqwest::Client as HttpClient;
use tokio::time::sleep;
use tracing::{debug, warn};
use url::Url;

use super::dto::{QuotesResponse, SymbolsResponse};
use crate::domain::Symbol;
use crate::error::ProviderError;
use crate::infrastructure::config::provider::HttpPollConfig;
use crate::port::{PolledQuote, PollProvider};

/// HTTP client for the quote REST API.
pub struct HttpPollProvider {
    http: HttpClient,
    base_url: Url,
    timeout_ms: u64,
    retry_max_attempts: u32,
    retry_backoff_ms: u64,
}

impl HttpPollProvider {
    /// Build a client from config.
    ///
    /// # Errors
    ///
    /// Returns an error if the base URL does not parse.
    #[allow(clippy::result_large_err)]
    pub fn from_config(config: &HttpPollConfig) -> crate::error::Result<Self> {
        let http = HttpClient::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .build()
            .unwrap_or_else(|err| {
                warn!(error = %err, "Failed to build HTTP client, using defaults");
                HttpClient::new()
            });
        let mut base_url = Url::parse(&config.url)?;
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        Ok(Self {
            http,
            base_url,
            timeout_ms: config.timeout_ms,
            retry_max_attempts: config.retry_max_attempts,
            retry_backoff_ms: config.retry_backoff_ms,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, ProviderError> {
        self.base_url
            .join(path)
            .map_err(|err| ProviderError::Transient(format!("bad endpoint {path}: {err}")))
    }

    fn quotes_url(&self, symbols: &[Symbol]) -> Result<Url, ProviderError> {
        let mut url = self.endpoint("quotes")?;
        let joined = symbols
            .iter()
            .map(Symbol::as_str)
            .collect::<Vec<_>>()
            .join(",");
        url.query_pairs_mut().append_pair("symbols", &joined);
        Ok(url)
    }

    async fn get_with_retry<T>(&self, url: Url) -> Result<T, ProviderError>
    where
        T: serde::de::DeserializeOwned,
    {
        let mut attempt = 0;
        let max_attempts = self.retry_max_attempts.max(1);

        loop {
            attempt += 1;
            let result = match self.http.get(url.clone()).send().await {
                Ok(response) => match response.error_for_status() {
                    Ok(response) => response.json::<T>().await,
                    Err(err) => return Err(self.provider_error(&err)),
                },
                Err(err) => Err(err),
            };

            match result {
                Ok(parsed) => return Ok(parsed),
                Err(err) => {
                    if attempt >= max_attempts || !Self::should_retry(&err) {
                        return Err(self.provider_error(&err));
                    }
                    self.backoff(attempt, max_attempts, &err).await;
                }
            }
        }
    }

    fn should_retry(err: &reqwest::Error) -> bool {
        err.is_timeout() || err.is_connect()
    }

    fn provider_error(&self, err: &reqwest::Error) -> ProviderError {
        if err.is_timeout() {
            return ProviderError::Timeout {
                operation: "http",
                after_ms: self.timeout_ms,
            };
        }
        ProviderError::Transient(err.to_string())
    }

    async fn backoff(&self, attempt: u32, max_attempts: u32, err: &reqwest::Error) {
        warn!(
            attempt,
            max_attempts,
            error = %err,
            "HTTP request failed, retrying"
        );
        if self.retry_backoff_ms > 0 {
            sleep(Duration::from_millis(self.retry_backoff_ms)).await;
        }
    }
}

#[async_trait]
impl PollProvider for HttpPollProvider {
    async fn universe(&self) -> Result<Vec<Symbol>, ProviderError> {
        let response: SymbolsResponse = self.get_with_retry(self.endpoint("symbols")?).await?;
        debug!(symbols = response.symbols.len(), "Fetched universe");
        Ok(response.symbols)
    }

    async fn fetch_batch(&self, symbols: &[Symbol]) -> Result<Vec<PolledQuote>, ProviderError> {
        if symbols.is_empty() {
            return Ok(Vec::new());
        }
        let response: QuotesResponse = self.get_with_retry(self.quotes_url(symbols)?).await?;
        let fetched_at = Utc::now();
        Ok(response
            .quotes
            .into_iter()
            .map(|quote| quote.into_polled(fetched_at))
            .collect())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider(url: &str) -> HttpPollProvider {
        HttpPollProvider::from_config(&HttpPollConfig {
            url: url.into(),
            ..HttpPollConfig::default()
        })
        .unwrap()
    }

    #[test]
    fn quotes_url_joins_symbols_under_base_path() {
        let provider = provider("http://localhost:8080/api");
        let url = provider
            .quotes_url(&[Symbol::from("HK.00700"), Symbol::from("US.AAPL")])
            .unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:8080/api/quotes?symbols=HK.00700%2CUS.AAPL"
        );
    }

    #[test]
    fn invalid_base_url_is_an_error() {
        let result = HttpPollProvider::from_config(&HttpPollConfig {
            url: "not a url".into(),
            ..HttpPollConfig::default()
        });
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn unreachable_server_is_transient() {
        let provider = HttpPollProvider::from_config(&HttpPollConfig {
            url: "http://127.0.0.1:9".into(),
            retry_max_attempts: 2,
            retry_backoff_ms: 0,
            ..HttpPollConfig::default()
        })
        .unwrap();
        let result = provider.universe().await;
        assert!(matches!(
            result,
            Err(ProviderError::Transient(_) | ProviderError::Timeout { .. })
        ));
    }
}
