//! HTTP client module
//!
//! GET client used to talk to the Ordway API.
//!
//! # Features
//!
//! - **Transport Retries**: exponential backoff on connection and timeout failures
//! - **Fatal Status Codes**: any non-2xx response fails the call with its body and URL
//! - **Rate Limiting**: per-client limiter using governor, fractional rates allowed

mod client;
mod rate_limit;

pub use client::{HttpClient, HttpClientConfig, HttpClientConfigBuilder, RequestConfig};
pub use rate_limit::{RateLimiter, RateLimiterConfig};
