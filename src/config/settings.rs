use std::time::Duration;

use clap::Parser;

use crate::resilience::retry::RetrySettings;
use crate::utils::constants::{IMAGE_RECOGNITION_PATH, NLP_PATH, SERVER_API_PATH};
use crate::utils::logging::{LogFormat, LogLevel};

/// Service configuration, resolved from CLI flags and environment variables.
#[derive(Debug, Clone, Parser)]
#[command(name = "food-gateway", about = "FatSecret proxy and nutrition tracker backend")]
pub struct Settings {
    /// Address the HTTP server binds to.
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:5001")]
    pub bind: String,

    /// OAuth client id for the client-credentials exchange.
    #[arg(long, env = "FATSECRET_CLIENT_ID")]
    pub client_id: String,

    /// OAuth client secret for the client-credentials exchange.
    #[arg(long, env = "FATSECRET_CLIENT_SECRET", hide_env_values = true)]
    pub client_secret: String,

    /// Authorization endpoint for the token exchange.
    #[arg(
        long,
        env = "FATSECRET_AUTH_URL",
        default_value = "https://oauth.fatsecret.com/connect/token"
    )]
    pub auth_url: String,

    /// Base URL of the upstream platform API.
    #[arg(
        long,
        env = "FATSECRET_PLATFORM_URL",
        default_value = "https://platform.fatsecret.com"
    )]
    pub platform_base: String,

    /// Path of the SQLite database holding nutrition logs.
    #[arg(long, env = "DATABASE_PATH", default_value = "food-gateway.db")]
    pub database_path: String,

    /// Safety margin before actual expiry at which a token is renewed.
    #[arg(long, env = "TOKEN_REFRESH_THRESHOLD_SECS", default_value_t = 3600)]
    pub refresh_threshold_secs: i64,

    /// Maximum attempts for token refreshes and proxied calls.
    #[arg(long, env = "MAX_RETRIES", default_value_t = 3)]
    pub max_retries: u32,

    /// Base backoff delay, doubled on every retry.
    #[arg(long, env = "RETRY_DELAY_MS", default_value_t = 2000)]
    pub retry_delay_ms: u64,

    /// Timeout for the token exchange request.
    #[arg(long, env = "AUTH_TIMEOUT_SECS", default_value_t = 10)]
    pub auth_timeout_secs: u64,

    /// Timeout for proxied API requests.
    #[arg(long, env = "API_TIMEOUT_SECS", default_value_t = 30)]
    pub api_timeout_secs: u64,

    #[arg(long, env = "LOG_LEVEL", value_enum, default_value_t = LogLevel::Info)]
    pub log_level: LogLevel,

    #[arg(long, env = "LOG_FORMAT", value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

impl Settings {
    pub fn retry(&self) -> RetrySettings {
        RetrySettings::new(self.max_retries, self.retry_delay_ms)
    }

    pub fn auth_timeout(&self) -> Duration {
        Duration::from_secs(self.auth_timeout_secs)
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api_timeout_secs)
    }

    /// Legacy `server.api` endpoint taking form-encoded method calls.
    pub fn server_api_url(&self) -> String {
        format!("{}{}", self.platform_base, SERVER_API_PATH)
    }

    /// Natural-language-processing endpoint, JSON body only.
    pub fn nlp_url(&self) -> String {
        format!("{}{}", self.platform_base, NLP_PATH)
    }

    /// Image-recognition endpoint, JSON body only.
    pub fn image_recognition_url(&self) -> String {
        format!("{}{}", self.platform_base, IMAGE_RECOGNITION_PATH)
    }
}
