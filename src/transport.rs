//! Rate-limited HTTP transport for the hosting API.
//!
//! All outbound hosting calls pass through [`RateLimitedTransport`], which is
//! the single writer of the process-wide [`RateBudget`]:
//!
//! - before sending, the budget is checked; an exhausted budget fails with
//!   `RateLimitExceeded` without touching the network,
//! - every received response updates the budget from the standard
//!   `x-ratelimit-*` headers,
//! - connection failures retry with bounded exponential backoff (base delay
//!   doubling per attempt) and surface as `TransientNetworkError` only after
//!   the attempts are exhausted,
//! - non-2xx responses surface as `HostingAPIError { status, body }`, except
//!   a 403/429 with the budget exhausted, which maps to `RateLimitExceeded`.
//!
//! Header names and their epoch-seconds reset format follow GitHub
//! conventions; this parsing is the narrow per-API adapter, and the [`Transport`]
//! contract itself is host-agnostic.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::models::RateBudget;

/// One request against the hosting API, relative to the configured base URL.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub path: String,
    pub query: Vec<(String, String)>,
}

impl ApiRequest {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            query: Vec::new(),
        }
    }

    pub fn with_query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }
}

/// A received hosting API response with its body already decoded.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: u16,
    pub body: serde_json::Value,
}

/// Seam between the hosting client and the wire.
///
/// The production implementation is [`RateLimitedTransport`]; tests substitute
/// a scripted double that replays canned responses.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse>;

    /// Current view of the rate budget. Read-only for callers.
    fn budget(&self) -> &RateBudget;
}

/// Production transport backed by reqwest.
pub struct RateLimitedTransport {
    http: reqwest::Client,
    api_base: String,
    token: Option<String>,
    budget: RateBudget,
    max_attempts: u32,
    base_delay: Duration,
}

impl RateLimitedTransport {
    /// Build a transport from configuration. Reads the bearer credential from
    /// the environment variable named in `hosting.token_env`; a missing
    /// variable selects the unauthenticated, lower-quota mode.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.hosting.timeout_secs))
            .user_agent(concat!("rscout/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let token = std::env::var(&config.hosting.token_env).ok();

        let transport = Self {
            http,
            api_base: config.hosting.api_base.trim_end_matches('/').to_string(),
            token,
            budget: RateBudget::default(),
            max_attempts: config.retry.max_attempts.max(1),
            base_delay: Duration::from_millis(config.retry.base_delay_ms),
        };
        debug!(
            env = %config.hosting.token_env,
            authenticated = transport.is_authenticated(),
            "hosting transport ready"
        );
        Ok(transport)
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn observe_headers(&mut self, headers: &HeaderMap) {
        let limit = header_u32(headers, "x-ratelimit-limit");
        let remaining = header_u32(headers, "x-ratelimit-remaining");
        let reset_at = header_u32(headers, "x-ratelimit-reset")
            .and_then(|secs| Utc.timestamp_opt(i64::from(secs), 0).single());
        self.budget.observe(limit, remaining, reset_at);
    }
}

fn header_u32(headers: &HeaderMap, name: &str) -> Option<u32> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse().ok())
}

#[async_trait]
impl Transport for RateLimitedTransport {
    async fn send(&mut self, request: &ApiRequest) -> Result<ApiResponse> {
        self.budget.authorize(Utc::now())?;

        let url = format!("{}{}", self.api_base, request.path);
        let mut last_failure = String::new();

        for attempt in 0..self.max_attempts {
            if attempt > 0 {
                // Exponent capped so a large attempt count cannot overflow
                // the multiplier.
                let delay = self.base_delay * 2u32.pow((attempt - 1).min(16));
                warn!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    "transient network failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }

            let mut builder = self
                .http
                .get(&url)
                .query(&request.query)
                .header("Accept", "application/vnd.github+json");
            if let Some(token) = &self.token {
                builder = builder.bearer_auth(token);
            }

            let response = match builder.send().await {
                Ok(response) => response,
                Err(e) => {
                    last_failure = e.to_string();
                    continue;
                }
            };

            let status = response.status();
            self.observe_headers(response.headers());
            debug!(
                status = status.as_u16(),
                path = %request.path,
                remaining = ?self.budget.remaining,
                "hosting API response"
            );

            if status.is_success() {
                let body: serde_json::Value = response.json().await.map_err(|e| {
                    Error::HostingApi {
                        status: status.as_u16(),
                        body: format!("invalid JSON body: {}", e),
                    }
                })?;
                return Ok(ApiResponse {
                    status: status.as_u16(),
                    body,
                });
            }

            let body = response.text().await.unwrap_or_default();

            // GitHub reports quota exhaustion as 403 (or 429) with remaining 0.
            if (status.as_u16() == 403 || status.as_u16() == 429)
                && self.budget.remaining == Some(0)
            {
                return Err(Error::RateLimitExceeded {
                    reset_at: self.budget.reset_at,
                });
            }

            return Err(Error::HostingApi {
                status: status.as_u16(),
                body,
            });
        }

        Err(Error::TransientNetwork {
            attempts: self.max_attempts,
            reason: last_failure,
        })
    }

    fn budget(&self) -> &RateBudget {
        &self.budget
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::header::{HeaderName, HeaderValue};

    fn headers(limit: &str, remaining: &str, reset: &str) -> HeaderMap {
        let mut map = HeaderMap::new();
        map.insert(
            HeaderName::from_static("x-ratelimit-limit"),
            HeaderValue::from_str(limit).unwrap(),
        );
        map.insert(
            HeaderName::from_static("x-ratelimit-remaining"),
            HeaderValue::from_str(remaining).unwrap(),
        );
        map.insert(
            HeaderName::from_static("x-ratelimit-reset"),
            HeaderValue::from_str(reset).unwrap(),
        );
        map
    }

    fn transport() -> RateLimitedTransport {
        RateLimitedTransport::from_config(&Config::minimal()).unwrap()
    }

    #[test]
    fn test_unset_token_env_is_unauthenticated() {
        let mut config = Config::minimal();
        config.hosting.token_env = "RSCOUT_TEST_UNSET_TOKEN".to_string();
        let t = RateLimitedTransport::from_config(&config).unwrap();
        assert!(!t.is_authenticated());
    }

    #[test]
    fn test_headers_update_budget() {
        let mut t = transport();
        t.observe_headers(&headers("60", "59", "4102444800"));
        assert_eq!(t.budget().limit, Some(60));
        assert_eq!(t.budget().remaining, Some(59));
        assert!(t.budget().reset_at.is_some());
    }

    #[test]
    fn test_malformed_headers_ignored() {
        let mut t = transport();
        t.observe_headers(&headers("sixty", "-1", "soon"));
        assert_eq!(t.budget().limit, None);
        assert_eq!(t.budget().remaining, None);
        assert_eq!(t.budget().reset_at, None);
    }

    #[tokio::test]
    async fn test_exhausted_budget_fails_before_network() {
        let mut t = transport();
        // Simulate the 60th unauthenticated response reporting exhaustion
        // with a reset one hour out (epoch far in the future).
        t.observe_headers(&headers("60", "0", "4102444800"));

        // The 61st call must fail without any network attempt; an attempted
        // request to this unroutable base would error differently.
        t.api_base = "http://192.0.2.1:9".to_string();
        let err = t.send(&ApiRequest::new("/rate_limit")).await.unwrap_err();
        assert!(matches!(err, Error::RateLimitExceeded { .. }));
    }
}
