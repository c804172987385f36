pub use axum::Router;
pub use tokio::task::JoinHandle;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use reqwest::Client;

use crate::auth::token_manager::{AuthConfig, TokenManager};
use crate::config::settings::Settings;
use crate::observability::metrics::Metrics;
use crate::resilience::retry::RetrySettings;
use crate::upstream::client::UpstreamClient;

/// Spawn an Axum router on an ephemeral port and return (JoinHandle, SocketAddr)
pub async fn spawn_axum(router: Router) -> (JoinHandle<()>, SocketAddr) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind failed");
    let addr = listener.local_addr().unwrap();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router).await.expect("server failed");
    });
    (handle, addr)
}

pub fn build_reqwest_client() -> Client {
    Client::builder()
        .timeout(Duration::from_secs(5))
        .build()
        .expect("reqwest client")
}

/// Auth config pointed at a mock authorization endpoint, with fast retries.
pub fn test_auth_config(auth_url: &str) -> AuthConfig {
    AuthConfig {
        auth_url: auth_url.to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        refresh_threshold_secs: 3600,
        retry: RetrySettings::new(3, 10),
        timeout: Duration::from_secs(5),
    }
}

pub fn token_manager(auth_url: &str) -> TokenManager {
    TokenManager::new(test_auth_config(auth_url), Metrics::new())
}

/// Manager holding a token that stays valid for the whole test; its auth
/// endpoint is unreachable, so any refresh attempt would fail loudly.
pub async fn seeded_manager() -> TokenManager {
    let manager = token_manager("http://127.0.0.1:1/connect/token");
    manager.seed("tok_seed", Utc::now().timestamp() + 86_400).await;
    manager
}

pub fn upstream_client(tokens: TokenManager, attempts: u32, base_delay_ms: u64) -> UpstreamClient {
    UpstreamClient::new(
        tokens,
        RetrySettings::new(attempts, base_delay_ms),
        Duration::from_secs(5),
        Metrics::new(),
    )
}

/// Settings pointed at mock upstream servers; everything else is defaults.
pub fn test_settings(auth_url: &str, platform_base: &str) -> Settings {
    use crate::utils::logging::{LogFormat, LogLevel};

    Settings {
        bind: "127.0.0.1:0".to_string(),
        client_id: "client-id".to_string(),
        client_secret: "client-secret".to_string(),
        auth_url: auth_url.to_string(),
        platform_base: platform_base.to_string(),
        database_path: ":memory:".to_string(),
        refresh_threshold_secs: 3600,
        max_retries: 3,
        retry_delay_ms: 10,
        auth_timeout_secs: 5,
        api_timeout_secs: 5,
        log_level: LogLevel::Info,
        log_format: LogFormat::Compact,
    }
}

pub fn metrics() -> Arc<Metrics> {
    Metrics::new()
}
