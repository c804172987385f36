use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Result type alias for the gateway core.
pub type Result<T> = std::result::Result<T, GatewayError>;

/// Errors surfaced by the token manager, the upstream call wrapper and the
/// service layer around them.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The authorization endpoint could not be reached or rejected the
    /// credentials after exhausting retries.
    #[error("token acquisition failed: {0}")]
    TokenAcquisition(String),

    /// Network-level failure on a proxied call, surfaced after the retry
    /// budget is spent.
    #[error("upstream transport error: {0}")]
    Transport(String),

    /// The upstream service returned a well-formed logical error unrelated
    /// to authentication. Never retried; the upstream message is preserved.
    #[error("upstream error: {0}")]
    Upstream(String),

    /// The inbound request is malformed or missing required parameters.
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// The requested local resource does not exist.
    #[error("{0}")]
    NotFound(String),

    /// Local persistence failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<rusqlite::Error> for GatewayError {
    fn from(e: rusqlite::Error) -> Self {
        GatewayError::Storage(e.to_string())
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = match self {
            GatewayError::TokenAcquisition(_) => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
            GatewayError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GatewayError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            GatewayError::NotFound(_) => StatusCode::NOT_FOUND,
            GatewayError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.to_string() }))).into_response()
    }
}
