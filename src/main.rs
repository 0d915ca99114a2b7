//! Decision Helper API — Binary Entrypoint
//! Boots the Axum HTTP server, wiring the completion client, decision
//! store, metrics, and routes.

mod api;
mod completion;
mod config;
mod metrics;
mod parse;
mod pipeline;
mod prompts;
mod scoring;
mod store;

use shuttle_axum::ShuttleAxum;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::api::AppState;
use crate::config::{PipelineConfig, DEFAULT_CONFIG_PATH};

/// Enable compact tracing logs in development only.
/// Activation requires BOTH:
///   - dev environment (debug build OR SHUTTLE_ENV in {local, development, dev})
///   - PIPELINE_DEV_LOG=1
fn enable_dev_tracing() {
    let dev_flag = std::env::var("PIPELINE_DEV_LOG")
        .ok()
        .is_some_and(|v| v == "1");

    let is_dev_env = cfg!(debug_assertions)
        || matches!(
            std::env::var("SHUTTLE_ENV")
                .unwrap_or_default()
                .to_ascii_lowercase()
                .as_str(),
            "local" | "development" | "dev"
        );

    if !(dev_flag && is_dev_env) {
        return;
    }

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("pipeline=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().compact())
        .init();
}

#[shuttle_runtime::main]
async fn axum() -> ShuttleAxum {
    // Load .env in local/dev; no-op in prod environments. This enables
    // OPENROUTER_API_KEY and COMPLETION_TEST_MODE from .env.
    let _ = dotenvy::dotenv();

    // Initialize dev tracing early (no-op in production).
    enable_dev_tracing();

    let cfg = PipelineConfig::load_or_default(DEFAULT_CONFIG_PATH);

    let prometheus = crate::metrics::Metrics::init(cfg.retries);

    let client = completion::build_client_from_config(&cfg);
    let decision_store = store::build_store_from_config(cfg.database_url.as_deref());

    let state = AppState::new(client, decision_store);
    let router = api::create_router(state).merge(prometheus.router());

    Ok(router.into())
}
