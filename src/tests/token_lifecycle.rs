//! Token manager behavior: refresh policy, concurrency and failure handling.

use chrono::Utc;
use httpmock::prelude::*;
use serde_json::json;
use tokio::time::{sleep, Duration};

use crate::auth::token_manager::TokenManager;
use crate::observability::metrics::Metrics;
use crate::tests::common::{test_auth_config, token_manager};

fn token_body(token: &str, expires_in: i64) -> serde_json::Value {
    json!({ "access_token": token, "expires_in": expires_in, "scope": "basic" })
}

/// Manager whose renewal margin is small enough for the background timer to
/// fire within a test.
fn short_lived_manager(auth_url: &str, threshold_secs: i64) -> TokenManager {
    let mut cfg = test_auth_config(auth_url);
    cfg.refresh_threshold_secs = threshold_secs;
    TokenManager::new(cfg, Metrics::new())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_callers_share_one_refresh() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST)
                .path("/connect/token")
                .body_includes("grant_type=client_credentials");
            then.status(200).json_body(token_body("tok_abc", 86_400));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let m = manager.clone();
        handles.push(tokio::spawn(async move { m.get_token(false).await }));
    }
    for handle in handles {
        let token = handle.await.unwrap().unwrap();
        assert_eq!(token, "tok_abc");
    }

    assert_eq!(mock.hits_async().await, 1, "only one caller may hit the network");
}

#[tokio::test]
async fn fresh_token_skips_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_new", 86_400));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    manager.seed("tok_cached", Utc::now().timestamp() + 7200).await;

    let token = manager.get_token(false).await.unwrap();
    assert_eq!(token, "tok_cached");
    assert_eq!(mock.hits_async().await, 0);
}

#[tokio::test]
async fn forced_refresh_always_hits_network() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_forced", 86_400));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    manager.seed("tok_cached", Utc::now().timestamp() + 86_400).await;

    let token = manager.get_token(true).await.unwrap();
    assert_eq!(token, "tok_forced");
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn expired_token_triggers_refresh() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_123", 86_400));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    manager.seed("tok_old", Utc::now().timestamp() - 1).await;

    let token = manager.get_token(false).await.unwrap();
    assert_eq!(token, "tok_123");
    assert_eq!(mock.hits_async().await, 1);

    let (active, remaining) = manager.status().await;
    assert!(active);
    assert!(remaining > 86_000, "expiry must be pushed out by expires_in");
}

#[tokio::test]
async fn within_threshold_token_is_treated_as_stale() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_renewed", 86_400));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    // Still technically valid, but inside the one hour safety margin.
    manager.seed("tok_expiring", Utc::now().timestamp() + 600).await;

    let token = manager.get_token(false).await.unwrap();
    assert_eq!(token, "tok_renewed");
    assert_eq!(mock.hits_async().await, 1);
}

#[tokio::test]
async fn failed_refresh_retries_then_keeps_prior_state() {
    let server = MockServer::start_async().await;
    let failing = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(500).body("authorization server down");
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    manager.seed("tok_stale", Utc::now().timestamp() - 10).await;

    let err = manager.get_token(false).await.unwrap_err();
    assert!(matches!(err, crate::GatewayError::TokenAcquisition(_)));
    // Retried up to the configured bound.
    assert_eq!(failing.hits_async().await, 3);
    // The stale token is left in place rather than cleared.
    let (active, _) = manager.status().await;
    assert!(active);

    // No failure state is cached: once the endpoint recovers, the next
    // caller succeeds from scratch.
    failing.delete_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_recovered", 86_400));
        })
        .await;

    let token = manager.get_token(false).await.unwrap();
    assert_eq!(token, "tok_recovered");
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn background_timer_renews_token_without_a_caller() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_auto", 2));
        })
        .await;

    // expires_in 2s with a 1s margin: the timer fires one second after the
    // initial acquisition.
    let manager = short_lived_manager(&server.url("/connect/token"), 1);
    manager.get_token(false).await.unwrap();
    assert_eq!(mock.hits_async().await, 1);

    sleep(Duration::from_millis(1500)).await;
    assert!(
        mock.hits_async().await >= 2,
        "scheduled renewal must hit the network with no caller involved"
    );

    let (active, _) = manager.status().await;
    assert!(active);
    manager.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_cancels_the_scheduled_renewal() {
    let server = MockServer::start_async().await;
    let mock = server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(200).json_body(token_body("tok_once", 2));
        })
        .await;

    let manager = short_lived_manager(&server.url("/connect/token"), 1);
    manager.get_token(false).await.unwrap();
    manager.shutdown().await;

    sleep(Duration::from_millis(1500)).await;
    assert_eq!(
        mock.hits_async().await,
        1,
        "no renewal may run after shutdown"
    );
}

#[tokio::test]
async fn rejected_credentials_surface_as_acquisition_error() {
    let server = MockServer::start_async().await;
    server
        .mock_async(|when, then| {
            when.method(POST).path("/connect/token");
            then.status(401).json_body(json!({"error": "invalid_client"}));
        })
        .await;

    let manager = token_manager(&server.url("/connect/token"));
    let err = manager.get_token(false).await.unwrap_err();
    assert!(err.to_string().contains("token acquisition failed"));
}
