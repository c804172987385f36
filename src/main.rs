use clap::Parser;
use tracing::{info, warn};

use food_gateway::config::settings::Settings;
use food_gateway::observability::metrics::Metrics;
use food_gateway::server::server::{start, AppState};
use food_gateway::store::tracker::Store;
use food_gateway::utils::logging::init_logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::parse();
    init_logging(settings.log_level, settings.log_format);

    let store = Store::open(&settings.database_path)?;
    let metrics = Metrics::new();
    let state = AppState::new(settings, store, metrics);

    // Warm the token cache; on failure the on-demand path retries from
    // scratch on the first proxied request.
    match state.tokens.get_token(false).await {
        Ok(_) => info!("initial token successfully obtained"),
        Err(e) => warn!("failed to obtain initial token: {e}; will retry on first API request"),
    }

    start(state).await
}
