use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use tracing::info;

use crate::auth::token_manager::{AuthConfig, TokenManager};
use crate::config::settings::Settings;
use crate::observability;
use crate::observability::metrics::Metrics;
use crate::routes;
use crate::store::tracker::Store;
use crate::upstream::client::UpstreamClient;

/// Shared handler state: configuration, the token manager singleton, the
/// resilient upstream client and the nutrition store.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub tokens: TokenManager,
    pub upstream: UpstreamClient,
    pub store: Store,
    pub metrics: Arc<Metrics>,
}

impl AppState {
    pub fn new(settings: Settings, store: Store, metrics: Arc<Metrics>) -> Self {
        let settings = Arc::new(settings);
        let tokens = TokenManager::new(AuthConfig::from(settings.as_ref()), metrics.clone());
        let upstream = UpstreamClient::new(
            tokens.clone(),
            settings.retry(),
            settings.api_timeout(),
            metrics.clone(),
        );
        Self {
            settings,
            tokens,
            upstream,
            store,
            metrics,
        }
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        .merge(routes::router())
        .merge(observability::routes::router())
        .with_state(state)
}

pub async fn start(state: AppState) -> Result<()> {
    let bind_addr = state.settings.bind.clone();
    let tokens = state.tokens.clone();
    let metrics = state.metrics.clone();
    let app = app(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("listening on {bind_addr}");
    metrics.up.set(1);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(tokens))
        .await?;
    Ok(())
}

async fn shutdown_signal(tokens: TokenManager) {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received, cancelling pending refresh timer");
    tokens.shutdown().await;
}
