//! Tap configuration
//!
//! The config JSON is read once at startup into an immutable [`RunContext`],
//! which is then passed by reference to the engine, request handlers and
//! transformers. Nothing downstream mutates it.

use crate::error::{Error, Result};
use crate::types::{JsonValue, OptionStringExt};
use crate::utils::{parse_datetime, snake_case};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use url::Url;

/// Production API host
pub const BASE_API_URL: &str = "https://api.ordwaylabs.com/api";

/// Staging API host
pub const BASE_STAGING_URL: &str = "https://staging.ordwaylabs.com/api";

/// API version used when none is configured
pub const DEFAULT_API_VERSION: &str = "v1";

/// Per-request timeout in seconds
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Keys that must be present in the config file
pub const REQUIRED_CONFIG_KEYS: [&str; 5] =
    ["company", "api_key", "user_email", "user_token", "start_date"];

// ============================================================================
// Raw Config
// ============================================================================

/// Config file contents, as supplied by the caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// Ordway company name
    pub company: String,

    /// API key
    pub api_key: String,

    /// Email of the API user
    pub user_email: String,

    /// Token of the API user
    pub user_token: String,

    /// Optional company token
    #[serde(default)]
    pub company_token: Option<String>,

    /// Earliest date to replicate from
    pub start_date: String,

    /// API version (`v1` or `1`)
    #[serde(default)]
    pub api_version: Option<String>,

    /// Use the staging environment
    #[serde(default)]
    pub staging: bool,

    /// Override for the API base URL
    #[serde(default)]
    pub api_url: Option<String>,

    /// Maximum requests per second, `null` disables limiting
    #[serde(default)]
    pub rate_limit_rps: Option<f64>,
}

impl TapConfig {
    /// Parse a config from a JSON value, reporting the first missing required key
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        let obj = value
            .as_object()
            .ok_or_else(|| Error::config("Config must be a JSON object"))?;

        for key in REQUIRED_CONFIG_KEYS {
            if obj.get(key).map_or(true, JsonValue::is_null) {
                return Err(Error::missing_field(key));
            }
        }

        Ok(serde_json::from_value(value.clone())?)
    }
}

// ============================================================================
// Run Context
// ============================================================================

/// Validated, immutable configuration for one tap run
#[derive(Debug, Clone)]
pub struct RunContext {
    /// Company name as configured
    company: String,

    /// `company_id` value injected into every record
    company_id: String,

    /// Parsed start date
    start_date: DateTime<Utc>,

    /// Base URL all endpoint paths are appended to (always ends with `/`)
    base_url: String,

    /// Request headers carrying credentials
    headers: HashMap<String, String>,

    /// Maximum requests per second
    rate_limit_rps: Option<f64>,
}

impl RunContext {
    /// Validate a raw config and build the run context
    pub fn from_config(config: &TapConfig) -> Result<Self> {
        let start_date = parse_datetime(&config.start_date)
            .map_err(|e| Error::invalid_value("start_date", e.to_string()))?;

        if let Some(rps) = config.rate_limit_rps {
            if !rps.is_finite() || rps <= 0.0 {
                return Err(Error::invalid_value(
                    "rate_limit_rps",
                    "must be set to `null` or a number GREATER THAN 0",
                ));
            }
        }

        let base_url = resolve_base_url(config)?;

        let mut headers = HashMap::new();
        headers.insert("X-User-Company".to_string(), config.company.clone());
        headers.insert("X-User-Token".to_string(), config.user_token.clone());
        headers.insert("X-User-Email".to_string(), config.user_email.clone());
        headers.insert("X-API-KEY".to_string(), config.api_key.clone());
        headers.insert("Accept".to_string(), "application/json".to_string());
        if let Some(token) = config.company_token.clone().none_if_empty() {
            headers.insert("X-Company-Token".to_string(), token);
        }

        Ok(Self {
            company: config.company.clone(),
            company_id: snake_case(&config.company),
            start_date,
            base_url,
            headers,
            rate_limit_rps: config.rate_limit_rps,
        })
    }

    /// Parse and validate a config JSON value in one step
    pub fn from_value(value: &JsonValue) -> Result<Self> {
        Self::from_config(&TapConfig::from_value(value)?)
    }

    /// Company name as configured
    pub fn company(&self) -> &str {
        &self.company
    }

    /// Company identifier injected into records
    pub fn company_id(&self) -> &str {
        &self.company_id
    }

    /// Configured start date
    pub fn start_date(&self) -> DateTime<Utc> {
        self.start_date
    }

    /// Base URL for API requests
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Credential headers sent with every request
    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Configured request rate limit
    pub fn rate_limit_rps(&self) -> Option<f64> {
        self.rate_limit_rps
    }

    /// User agent sent with every request
    pub fn user_agent(&self) -> String {
        format!(
            "tap-ordway v{} (https://github.com/ordwaylabs/tap-ordway)",
            crate::VERSION
        )
    }
}

/// Normalize an API version to its `v`-prefixed form
fn normalize_api_version(version: Option<&str>) -> String {
    match version.map(str::trim).filter(|v| !v.is_empty()) {
        None => DEFAULT_API_VERSION.to_string(),
        Some(v) if v.to_lowercase().starts_with('v') => v.to_string(),
        Some(v) => format!("v{v}"),
    }
}

fn resolve_base_url(config: &TapConfig) -> Result<String> {
    let base = match config.api_url.clone().none_if_empty() {
        Some(url) => {
            Url::parse(&url).map_err(|e| Error::invalid_value("api_url", e.to_string()))?;
            url
        }
        None => {
            let host = if config.staging {
                BASE_STAGING_URL
            } else {
                BASE_API_URL
            };
            format!(
                "{host}/{}",
                normalize_api_version(config.api_version.as_deref())
            )
        }
    };

    Ok(if base.ends_with('/') {
        base
    } else {
        format!("{base}/")
    })
}
