//! Resilient wrapper around outbound platform API calls.
//!
//! Every proxied operation goes through [`UpstreamClient::call`], which
//! handles transient transport failures, authentication expiry and the
//! upstream convention of signaling logical errors inside an HTTP 200 body,
//! so route handlers never reimplement retry logic.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue, StatusCode};
use reqwest::Client;
use serde_json::Value;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::auth::token_manager::TokenManager;
use crate::error::{GatewayError, Result};
use crate::observability::metrics::Metrics;
use crate::resilience::retry::RetrySettings;
use crate::utils::constants::IMAGE_PAYLOAD_KEY;

/// Body of a proxied request. The upstream API takes form-encoded bodies for
/// the method-dispatch endpoint and JSON bodies for the NLP and
/// image-recognition endpoints.
#[derive(Debug, Clone)]
pub enum Payload {
    Form(HashMap<String, String>),
    Json(Value),
}

impl Payload {
    pub fn form(params: HashMap<String, String>) -> Self {
        Payload::Form(params)
    }

    pub fn json(body: Value) -> Self {
        Payload::Json(body)
    }

    /// Encoding rule for generic proxied parameter maps: a payload carrying
    /// an image field is always sent as JSON, everything else as form data.
    pub fn detect(value: Value) -> Self {
        match value {
            Value::Object(ref map) if map.contains_key(IMAGE_PAYLOAD_KEY) => Payload::Json(value),
            Value::Object(map) => {
                let form = map
                    .into_iter()
                    .map(|(k, v)| {
                        let rendered = match v {
                            Value::String(s) => s,
                            other => other.to_string(),
                        };
                        (k, rendered)
                    })
                    .collect();
                Payload::Form(form)
            }
            other => Payload::Json(other),
        }
    }
}

/// Builds the headers map a route handler passes into [`UpstreamClient::call`].
///
/// The map is caller-owned and mutated in place when the wrapper forces a
/// token refresh; callers must not share one map across concurrent logical
/// requests without copying it first.
pub fn bearer_headers(token: &str) -> Result<HeaderMap> {
    let mut headers = HeaderMap::new();
    let value = HeaderValue::try_from(format!("Bearer {token}"))
        .map_err(|e| GatewayError::TokenAcquisition(format!("token not header-safe: {e}")))?;
    headers.insert(AUTHORIZATION, value);
    Ok(headers)
}

#[derive(Clone)]
pub struct UpstreamClient {
    http: Client,
    tokens: TokenManager,
    retry: RetrySettings,
    metrics: Arc<Metrics>,
}

impl UpstreamClient {
    pub fn new(
        tokens: TokenManager,
        retry: RetrySettings,
        timeout: Duration,
        metrics: Arc<Metrics>,
    ) -> Self {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            http,
            tokens,
            retry,
            metrics,
        }
    }

    /// Executes one logical upstream operation with a bounded retry budget.
    ///
    /// Outcome classification per attempt:
    /// - transport failure or non-2xx status: retried after
    ///   `base_delay * 2^attempt`;
    /// - HTTP 401/403: forced token refresh, `Authorization` rewritten in
    ///   place, retried (consumes a retry slot);
    /// - HTTP 2xx whose body is an error envelope: forced refresh and
    ///   immediate retry when the message names an invalid/expired token,
    ///   otherwise a terminal [`GatewayError::Upstream`] with zero retries;
    /// - HTTP 2xx with a well-formed body: returned.
    pub async fn call(&self, url: &str, headers: &mut HeaderMap, payload: &Payload) -> Result<Value> {
        let endpoint = endpoint_label(url);
        let attempts = self.retry.attempts;
        let mut last_err: Option<GatewayError> = None;

        for attempt in 0..attempts {
            debug!("upstream request attempt {}/{attempts}: {url}", attempt + 1);
            self.metrics
                .upstream_requests
                .with_label_values(&[endpoint])
                .inc();
            let timer = self
                .metrics
                .upstream_duration
                .with_label_values(&[endpoint])
                .start_timer();

            let request = match payload {
                Payload::Form(form) => self.http.post(url).headers(headers.clone()).form(form),
                Payload::Json(body) => self.http.post(url).headers(headers.clone()).json(body),
            };

            let outcome = request.send().await;
            timer.observe_duration();

            let response = match outcome {
                Ok(response) => response,
                Err(e) => {
                    warn!("request failed on attempt {}: {e}", attempt + 1);
                    last_err = Some(GatewayError::Transport(e.to_string()));
                    self.backoff_before_retry(endpoint, "transport", attempt).await;
                    continue;
                }
            };

            let status = response.status();
            if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
                warn!("authentication error ({status}), refreshing token before retry");
                last_err = Some(GatewayError::Transport(format!(
                    "upstream rejected credentials: {status}"
                )));
                if attempt + 1 < attempts {
                    self.refresh_authorization(headers).await?;
                }
                self.backoff_before_retry(endpoint, "auth", attempt).await;
                continue;
            }

            if !status.is_success() {
                warn!("upstream returned {status} on attempt {}", attempt + 1);
                last_err = Some(GatewayError::Transport(format!("upstream returned {status}")));
                self.backoff_before_retry(endpoint, "status", attempt).await;
                continue;
            }

            let text = match response.text().await {
                Ok(text) => text,
                Err(e) => {
                    last_err = Some(GatewayError::Transport(e.to_string()));
                    self.backoff_before_retry(endpoint, "transport", attempt).await;
                    continue;
                }
            };

            let body: Value = serde_json::from_str(&text).map_err(|e| {
                self.metrics
                    .upstream_failures
                    .with_label_values(&[endpoint, "malformed"])
                    .inc();
                GatewayError::Upstream(format!("invalid JSON from upstream: {e}"))
            })?;

            // The upstream signals logical errors with status 200 and an
            // embedded error envelope.
            if let Some(message) = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|m| m.as_str())
            {
                if is_invalid_token_message(message) && attempt + 1 < attempts {
                    warn!("invalid token reported by upstream, refreshing and retrying");
                    self.metrics
                        .upstream_retries
                        .with_label_values(&[endpoint, "invalid_token"])
                        .inc();
                    self.refresh_authorization(headers).await?;
                    continue;
                }
                self.metrics
                    .upstream_failures
                    .with_label_values(&[endpoint, "application"])
                    .inc();
                return Err(GatewayError::Upstream(message.to_string()));
            }

            return Ok(body);
        }

        self.metrics
            .upstream_failures
            .with_label_values(&[endpoint, "exhausted"])
            .inc();
        Err(last_err
            .unwrap_or_else(|| GatewayError::Transport("retry budget is zero".to_string())))
    }

    /// One attempt with no retry, refresh or envelope handling. Returns the
    /// raw status and body so diagnostic routes can show exactly what the
    /// upstream answered.
    pub async fn call_once(
        &self,
        url: &str,
        headers: &HeaderMap,
        payload: &Payload,
    ) -> Result<(u16, Value)> {
        let request = match payload {
            Payload::Form(form) => self.http.post(url).headers(headers.clone()).form(form),
            Payload::Json(body) => self.http.post(url).headers(headers.clone()).json(body),
        };

        let response = request
            .send()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;
        let status = response.status().as_u16();
        let text = response
            .text()
            .await
            .map_err(|e| GatewayError::Transport(e.to_string()))?;

        // Non-JSON bodies are passed through as text rather than rejected.
        let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
        Ok((status, body))
    }

    /// Forces a token refresh and rewrites the caller's `Authorization`
    /// header, so the next attempt carries a fresh bearer token.
    async fn refresh_authorization(&self, headers: &mut HeaderMap) -> Result<()> {
        let token = self.tokens.get_token(true).await?;
        let value = HeaderValue::try_from(format!("Bearer {token}"))
            .map_err(|e| GatewayError::TokenAcquisition(format!("token not header-safe: {e}")))?;
        headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    async fn backoff_before_retry(&self, endpoint: &str, reason: &str, attempt: u32) {
        if attempt + 1 >= self.retry.attempts {
            return;
        }
        self.metrics
            .upstream_retries
            .with_label_values(&[endpoint, reason])
            .inc();
        let delay = self.retry.backoff(attempt);
        debug!("retrying in {delay:?}");
        sleep(delay).await;
    }
}

fn is_invalid_token_message(message: &str) -> bool {
    let message = message.to_lowercase();
    message.contains("token is invalid")
        || (message.contains("token") && message.contains("expired"))
}

fn endpoint_label(url: &str) -> &str {
    url.rsplit('/').next().unwrap_or("unknown")
}
