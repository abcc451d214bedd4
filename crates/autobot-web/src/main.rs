//! AutoBot web chat.
//!
//! Server-rendered pages for login, conversation picking and natural-language
//! car search over the listings table.

mod config;
mod error;
mod routes;
mod session;
mod state;

use std::sync::Arc;

use car_search::{SearchPipeline, SearchStrategy};
use database::{Database, ListingStore};
use openai_brain::OpenAiBrain;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::state::AppState;

const DEFAULT_LOG_FILTER: &str = "autobot_web=info,car_search=info,database=info";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load .env file if present
    let _ = dotenvy::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .init();

    // Load configuration
    let config = Config::from_env()?;
    info!(addr = %config.addr, strategy = %config.strategy, "Starting AutoBot");

    // Connect to database
    let db = Database::connect(&config.database_url).await?;
    db.migrate().await?;

    let listings = match &config.listings_database_url {
        Some(url) => ListingStore::connect_read_only(url, config.listings_table.as_str()).await?,
        None => db.listings(&config.listings_table)?,
    };

    let pipeline = build_pipeline(&config, listings);
    info!(strategy = %pipeline.strategy(), "Search pipeline ready");

    // Build application state
    let state = AppState::new(db, pipeline, config.history_turns)
        .with_session_timeout(config.session_idle_timeout);

    // Build router
    let app = routes::router()
        .nest_service("/static", ServeDir::new("static"))
        .layer(TraceLayer::new_for_http())
        .with_state(state);

    // Start server
    info!(addr = %config.addr, "AutoBot listening");
    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

/// The model-backed pipeline when requested and configured, else keyword
/// search.
fn build_pipeline(config: &Config, listings: ListingStore) -> SearchPipeline {
    let pipeline_config = config.pipeline_config();

    if config.strategy == SearchStrategy::Keyword {
        return SearchPipeline::new(listings, pipeline_config);
    }

    match OpenAiBrain::from_env() {
        Ok(brain) => {
            info!(model = %brain.config().model, "Using language model");
            SearchPipeline::with_brain(listings, pipeline_config, Arc::new(brain))
        }
        Err(e) => {
            warn!(error = %e, "Language model unavailable, falling back to keyword search");
            SearchPipeline::new(listings, pipeline_config)
        }
    }
}
