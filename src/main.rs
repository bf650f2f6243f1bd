use anyhow::Result;
use axum::Router;
use std::sync::Arc;
use tower_http::trace::TraceLayer;

mod config;
mod error;
mod logging;
mod routes;
mod services;
pub mod models;

use services::clock::SystemClock;
use services::excel::WorkbookCorrector;
use services::grammar::{GrammarChecker, LanguageToolClient};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    logging::init_logging()?;

    // Load configuration
    let config = config::load_config()?;

    let checker = LanguageToolClient::new(&config.languagetool_url, &config.language, config.grammar_timeout)?;
    tracing::info!(
        "Using grammar service at {} ({})",
        config.languagetool_url,
        checker.language()
    );

    // Build our application state
    let addr = config.bind_addr;
    let state = Arc::new(AppState::new(config, checker));

    let app = build_router(state);

    // Run it
    tracing::info!("listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router<G: GrammarChecker + 'static>(state: Arc<AppState<G>>) -> Router {
    Router::new()
        .merge(routes::routes::<Arc<AppState<G>>>())
        .merge(routes::sheets::routes::<G>(state.config.max_file_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// Application state
pub struct AppState<G> {
    config: config::Config,
    corrector: WorkbookCorrector<G>,
}

impl<G: GrammarChecker> AppState<G> {
    fn new(config: config::Config, checker: G) -> Self {
        Self {
            config,
            corrector: WorkbookCorrector::new(checker, Arc::new(SystemClock)),
        }
    }
}
