//! OAuth client-credentials token lifecycle.
//!
//! Owns the single shared bearer token for the upstream platform API:
//! acquires it on demand, shares it across concurrent request handlers,
//! renews it ahead of expiry, and keeps at most one refresh request in
//! flight at any time.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::Utc;
use http::header::AUTHORIZATION;
use reqwest::Client;
use serde::Deserialize;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::config::settings::Settings;
use crate::error::{GatewayError, Result};
use crate::observability::metrics::Metrics;
use crate::resilience::retry::RetrySettings;

/// Everything the token manager needs to talk to the authorization endpoint.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub auth_url: String,
    pub client_id: String,
    pub client_secret: String,
    /// Safety margin before actual expiry at which the token is renewed.
    pub refresh_threshold_secs: i64,
    pub retry: RetrySettings,
    pub timeout: Duration,
}

impl From<&Settings> for AuthConfig {
    fn from(s: &Settings) -> Self {
        Self {
            auth_url: s.auth_url.clone(),
            client_id: s.client_id.clone(),
            client_secret: s.client_secret.clone(),
            refresh_threshold_secs: s.refresh_threshold_secs,
            retry: s.retry(),
            timeout: s.auth_timeout(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
    scope: Option<String>,
}

/// Shared mutable token state. Lives for the process lifetime; a restart
/// discards it and forces a fresh acquisition on first use.
#[derive(Debug, Default)]
struct TokenState {
    access_token: Option<String>,
    expires_at_unix: i64,
}

impl TokenState {
    /// Returns the cached token only if it stays valid for at least the
    /// configured safety margin.
    fn valid_token(&self, threshold_secs: i64, now_unix: i64) -> Option<String> {
        let token = self.access_token.as_ref()?;
        if self.expires_at_unix - now_unix < threshold_secs {
            return None;
        }
        Some(token.clone())
    }
}

struct Inner {
    http: Client,
    cfg: AuthConfig,
    state: RwLock<TokenState>,
    /// Serializes refreshes; the state lock alone would let two callers
    /// both observe a stale token and both hit the network.
    refresh_lock: Mutex<()>,
    /// Pending proactive refresh timer, replaced on every refresh.
    refresh_timer: Mutex<Option<JoinHandle<()>>>,
    metrics: Arc<Metrics>,
}

/// Cheaply cloneable handle; all clones share one `TokenState`.
#[derive(Clone)]
pub struct TokenManager {
    inner: Arc<Inner>,
}

impl TokenManager {
    pub fn new(cfg: AuthConfig, metrics: Arc<Metrics>) -> Self {
        let http = Client::builder()
            .timeout(cfg.timeout)
            .build()
            .expect("Failed to build HTTP client");
        Self {
            inner: Arc::new(Inner {
                http,
                cfg,
                state: RwLock::new(TokenState::default()),
                refresh_lock: Mutex::new(()),
                refresh_timer: Mutex::new(None),
                metrics,
            }),
        }
    }

    /// Returns a token valid for at least the refresh threshold, refreshing
    /// it first when forced, absent, or close to expiry.
    ///
    /// Double-checked locking: the fast path reads the shared state without
    /// the refresh lock; a caller that finds the token stale re-evaluates
    /// under the lock, because another caller may have refreshed while it
    /// was waiting. At most one network refresh runs at a time.
    pub async fn get_token(&self, force_refresh: bool) -> Result<String> {
        let threshold = self.inner.cfg.refresh_threshold_secs;

        if !force_refresh {
            let state = self.inner.state.read().await;
            if let Some(token) = state.valid_token(threshold, Utc::now().timestamp()) {
                return Ok(token);
            }
        }

        let _guard = self.inner.refresh_lock.lock().await;

        if !force_refresh {
            // Re-check under the lock: the previous holder may have done the work.
            let state = self.inner.state.read().await;
            if let Some(token) = state.valid_token(threshold, Utc::now().timestamp()) {
                return Ok(token);
            }
        }

        self.inner.cfg.retry.run_with_retry(|| self.refresh()).await
    }

    /// One client-credentials exchange. Called only under the refresh lock.
    /// A failed exchange leaves the prior (possibly stale) token in place.
    fn refresh(&self) -> Pin<Box<dyn Future<Output = Result<String>> + Send + '_>> {
        Box::pin(async move {
        debug!("requesting new access token from {}", self.inner.cfg.auth_url);

        let credentials = BASE64.encode(format!(
            "{}:{}",
            self.inner.cfg.client_id, self.inner.cfg.client_secret
        ));

        let response = self
            .inner
            .http
            .post(&self.inner.cfg.auth_url)
            .header(AUTHORIZATION, format!("Basic {credentials}"))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| {
                self.inner.metrics.token_refresh_failures.inc();
                GatewayError::TokenAcquisition(e.to_string())
            })?;

        if !response.status().is_success() {
            self.inner.metrics.token_refresh_failures.inc();
            return Err(GatewayError::TokenAcquisition(format!(
                "authorization endpoint returned {}",
                response.status()
            )));
        }

        let token: TokenResponse = response.json().await.map_err(|e| {
            self.inner.metrics.token_refresh_failures.inc();
            GatewayError::TokenAcquisition(format!("malformed token response: {e}"))
        })?;

        {
            let mut state = self.inner.state.write().await;
            state.access_token = Some(token.access_token.clone());
            state.expires_at_unix = Utc::now().timestamp() + token.expires_in;
        }
        self.inner.metrics.token_refreshes.inc();

        match &token.scope {
            Some(scope) => info!("token refreshed with scope: {scope}"),
            None => info!("token refreshed, expires in {}s", token.expires_in),
        }

        self.schedule_proactive_refresh(token.expires_in).await;
        Ok(token.access_token)
        })
    }

    /// Best-effort background renewal shortly before the safety margin is
    /// reached, so steady-state traffic rarely observes the slow path. The
    /// on-demand path stays correct without it.
    async fn schedule_proactive_refresh(&self, expires_in: i64) {
        let delay = expires_in - self.inner.cfg.refresh_threshold_secs;
        if delay <= 0 {
            return;
        }

        let manager = self.clone();
        let handle = tokio::spawn(async move {
            sleep(Duration::from_secs(delay as u64)).await;
            debug!("performing scheduled token refresh");
            if let Err(e) = manager.get_token(true).await {
                warn!("scheduled token refresh failed: {e}");
            }
        });

        let mut timer = self.inner.refresh_timer.lock().await;
        if let Some(previous) = timer.replace(handle) {
            previous.abort();
        }
        debug!("scheduled token refresh in {delay}s");
    }

    /// Cancel the pending proactive refresh timer, if any.
    pub async fn shutdown(&self) {
        if let Some(handle) = self.inner.refresh_timer.lock().await.take() {
            handle.abort();
        }
    }

    /// Whether a token is currently held and how many seconds remain.
    pub async fn status(&self) -> (bool, i64) {
        let state = self.inner.state.read().await;
        let remaining = (state.expires_at_unix - Utc::now().timestamp()).max(0);
        (state.access_token.is_some(), remaining)
    }

    #[cfg(test)]
    pub(crate) async fn seed(&self, token: &str, expires_at_unix: i64) {
        let mut state = self.inner.state.write().await;
        state.access_token = Some(token.to_string());
        state.expires_at_unix = expires_at_unix;
    }
}
