mod config;
mod errors;
mod interview;
mod llm_client;
mod report;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::Config;
use crate::interview::registry::SessionRegistry;
use crate::interview::session::InterviewEngine;
use crate::llm_client::LlmClient;
use crate::report::MarkdownReportWriter;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting interviewer API v{}", env!("CARGO_PKG_VERSION"));

    if config.groq_api_key.is_none() {
        warn!("GROQ_API_KEY is not set; every interview turn will fail until it is provided");
    }

    let llm = LlmClient::new(
        config.groq_api_key.clone(),
        config.groq_api_url.clone(),
        config.groq_model.clone(),
    )?;
    info!("LLM client initialized (model: {})", llm.model());

    let renderer = MarkdownReportWriter::new(config.reports_dir.clone());
    info!("Reports will be written to {}", config.reports_dir.display());

    let engine = InterviewEngine::new(Arc::new(llm), Arc::new(renderer), config.interview.clone());
    let settings = engine.settings();
    info!(
        "Interview engine ready: topic={}, questions={}, batch_size={}",
        settings.topic, settings.target_count, settings.batch_size
    );

    let state = AppState {
        sessions: SessionRegistry::new(),
        engine: Arc::new(engine),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive());

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
