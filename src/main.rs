use anyhow::Result;
use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tower_http::{
    catch_panic::CatchPanicLayer,
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

mod config;
mod document;
mod handlers;
mod models;
mod services;
mod utils;

use config::Settings;
use services::{FlashcardPipeline, JobRegistry, LlmService};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG")
                .unwrap_or_else(|_| "info,flashcards_api_server=debug".to_string()),
        )
        .with_target(true)
        .with_thread_ids(true)
        .json()
        .init();

    info!("🚀 Starting Flashcards API Server...");

    let settings = Settings::load()?;
    info!("✅ Configuration loaded");

    let llm_service = Arc::new(LlmService::new(settings.llm.clone()));
    let pipeline = Arc::new(FlashcardPipeline::new(&settings, llm_service.clone()));
    let registry = Arc::new(JobRegistry::new());
    info!("✅ Services initialized");

    let app = build_router(
        llm_service,
        pipeline,
        registry,
        settings.server.max_upload_mb,
    );

    let addr = SocketAddr::from((
        settings.server.host.parse::<std::net::IpAddr>()?,
        settings.server.port,
    ));
    info!("🎯 Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

fn build_router(
    llm_service: Arc<LlmService>,
    pipeline: Arc<FlashcardPipeline>,
    registry: Arc<JobRegistry>,
    max_upload_mb: usize,
) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/health/ready", get(handlers::health::readiness_check))
        .route("/api/upload", post(handlers::upload::upload_handler))
        .route("/api/jobs/{id}", get(handlers::jobs::job_status_handler))
        .route("/api/jobs/{id}/deck", get(handlers::jobs::download_deck_handler))
        .route("/api/jobs/{id}/summary", get(handlers::jobs::job_summary_handler))
        .route("/api/models", get(handlers::models::list_models_handler))
        .route("/api/models/refresh", post(handlers::models::refresh_models_handler))
        .layer(Extension(llm_service))
        .layer(Extension(pipeline))
        .layer(Extension(registry))
        .layer(
            CorsLayer::permissive()
                .allow_origin(tower_http::cors::Any)
                .allow_methods(tower_http::cors::Any)
                .allow_headers(tower_http::cors::Any),
        )
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(false)),
        )
        .layer(CatchPanicLayer::new())
        .layer(DefaultBodyLimit::max(max_upload_mb * 1024 * 1024))
}
