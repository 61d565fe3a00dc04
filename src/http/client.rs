//! HTTP client with retry and rate limiting
//!
//! Provides the GET client used by every request handler:
//! - Rate limiting before each outbound request
//! - Exponential backoff retries on transport failures only
//! - Any non-2xx response fails the call immediately

use super::rate_limit::{RateLimiter, RateLimiterConfig};
use crate::config::{RunContext, DEFAULT_TIMEOUT_SECS};
use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::Client;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, error, warn};

/// Configuration for the HTTP client
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Base URL for all requests
    pub base_url: Option<String>,
    /// Request timeout
    pub timeout: Duration,
    /// Maximum number of attempts per request (including the first)
    pub max_attempts: u32,
    /// Initial delay for backoff
    pub initial_backoff: Duration,
    /// Maximum delay for backoff
    pub max_backoff: Duration,
    /// Rate limiter configuration
    pub rate_limit: Option<RateLimiterConfig>,
    /// Default headers for all requests
    pub default_headers: HashMap<String, String>,
    /// User agent string
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            max_attempts: 3,
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(60),
            rate_limit: None,
            default_headers: HashMap::new(),
            user_agent: format!("tap-ordway/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl HttpClientConfig {
    /// Create a new config builder
    pub fn builder() -> HttpClientConfigBuilder {
        HttpClientConfigBuilder::default()
    }

    /// Client config for the Ordway API described by a run context
    pub fn from_context(ctx: &RunContext) -> Self {
        let mut builder = Self::builder()
            .base_url(ctx.base_url())
            .user_agent(ctx.user_agent());

        for (key, value) in ctx.headers() {
            builder = builder.header(key, value);
        }

        if let Some(limit) = RateLimiterConfig::from_rps(ctx.rate_limit_rps()) {
            builder = builder.rate_limit(limit);
        }

        builder.build()
    }
}

/// Builder for HTTP client config
#[derive(Default)]
pub struct HttpClientConfigBuilder {
    config: HttpClientConfig,
}

impl HttpClientConfigBuilder {
    /// Set the base URL
    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.base_url = Some(url.into());
        self
    }

    /// Set the request timeout
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Set max attempts
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.max_attempts = attempts;
        self
    }

    /// Set backoff delays
    pub fn backoff(mut self, initial: Duration, max: Duration) -> Self {
        self.config.initial_backoff = initial;
        self.config.max_backoff = max;
        self
    }

    /// Set rate limiter
    pub fn rate_limit(mut self, config: RateLimiterConfig) -> Self {
        self.config.rate_limit = Some(config);
        self
    }

    /// Add a default header
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.default_headers.insert(key.into(), value.into());
        self
    }

    /// Set user agent
    pub fn user_agent(mut self, agent: impl Into<String>) -> Self {
        self.config.user_agent = agent.into();
        self
    }

    /// Build the config
    pub fn build(self) -> HttpClientConfig {
        self.config
    }
}

/// Configuration for a single request
#[derive(Debug, Clone, Default)]
pub struct RequestConfig {
    /// Query parameters
    pub query: Vec<(String, String)>,
    /// Request headers
    pub headers: HashMap<String, String>,
}

impl RequestConfig {
    /// Create a new request config
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a query parameter
    #[must_use]
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Add a header
    #[must_use]
    pub fn header(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(key.into(), value.into());
        self
    }
}

/// HTTP client with retry and rate limiting
pub struct HttpClient {
    client: Client,
    config: HttpClientConfig,
    rate_limiter: Option<RateLimiter>,
}

impl HttpClient {
    /// Create a new HTTP client with custom configuration
    pub fn with_config(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()?;

        let rate_limiter = config.rate_limit.as_ref().map(RateLimiter::new);

        Ok(Self {
            client,
            config,
            rate_limiter,
        })
    }

    /// Client for the Ordway API described by a run context
    pub fn from_context(ctx: &RunContext) -> Result<Self> {
        Self::with_config(HttpClientConfig::from_context(ctx))
    }

    /// Make a GET request and parse the JSON response
    pub async fn get_json(&self, path: &str, config: RequestConfig) -> Result<JsonValue> {
        let full_url = self.build_url(path);
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            if let Some(ref limiter) = self.rate_limiter {
                limiter.wait().await;
            }

            let mut req = self.client.get(&full_url);

            for (key, value) in &self.config.default_headers {
                req = req.header(key.as_str(), value.as_str());
            }

            for (key, value) in &config.headers {
                req = req.header(key.as_str(), value.as_str());
            }

            if !config.query.is_empty() {
                req = req.query(&config.query);
            }

            match req.send().await {
                Ok(response) => {
                    let status = response.status();
                    let url = response.url().to_string();

                    if !status.is_success() {
                        let body = response.text().await.unwrap_or_default();
                        error!(
                            status = status.as_u16(),
                            body = %body,
                            url = %url,
                            "Ordway responded with a non-success status"
                        );
                        return Err(Error::http_status(status.as_u16(), body, url));
                    }

                    debug!("Request succeeded: GET {url}");
                    let body = response.text().await?;
                    return serde_json::from_str(&body).map_err(|e| {
                        Error::decode(format!("Invalid JSON from {url}: {e}"))
                    });
                }
                Err(e) => {
                    let err = Error::Http(e);
                    if err.is_retryable() && attempt < max_attempts {
                        let delay = self.calculate_backoff(attempt - 1);
                        warn!(
                            "Request to {} failed ({}), attempt {}/{}, retrying in {:?}",
                            full_url, err, attempt, max_attempts, delay
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }

                    if err.is_retryable() {
                        warn!("Giving up on {full_url} after {attempt} attempts: {err}");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Check if rate limiting is enabled
    pub fn has_rate_limiter(&self) -> bool {
        self.rate_limiter.is_some()
    }

    /// Build full URL from path
    pub fn build_url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }

        match &self.config.base_url {
            Some(base) => {
                let base = base.trim_end_matches('/');
                let path = path.trim_start_matches('/');
                format!("{base}/{path}")
            }
            None => path.to_string(),
        }
    }

    /// Calculate backoff delay for a given retry (0-based)
    pub fn calculate_backoff(&self, retry: u32) -> Duration {
        let factor = 2u32.saturating_pow(retry);
        std::cmp::min(
            self.config.initial_backoff.saturating_mul(factor),
            self.config.max_backoff,
        )
    }
}

impl std::fmt::Debug for HttpClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpClient")
            .field("config", &self.config)
            .field("has_rate_limiter", &self.rate_limiter.is_some())
            .finish_non_exhaustive()
    }
}
