//! PDF Vision - OCR/vision analysis of PDF pages and embedded images.

mod cache;
mod config;
mod error;
mod materialize;
mod ocr;
mod paths;
mod request;
mod vision;

use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::{get, post},
    Router,
};
use cache::MemoryResultCache;
use config::AppConfig;
use error::VisionError;
use materialize::PdfMaterializer;
use ocr::{EnvCredentials, OcrProviderClient, OcrResult, ReqwestTransport};
use paths::PathResolver;
use request::VisionArgs;
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use vision::VisionOrchestrator;

/// Application state shared across handlers.
#[derive(Clone)]
struct AppState {
    vision: Arc<VisionOrchestrator>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file if present
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "pdf_vision=debug,tower_http=debug".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    info!(
        "Project root: {} | provider: {} | cache capacity: {}",
        config.project_root.display(),
        config.provider.kind.as_str(),
        config
            .cache_capacity
            .map(|c| c.to_string())
            .unwrap_or_else(|| "unbounded".to_string())
    );

    let client = OcrProviderClient::new(
        Arc::new(ReqwestTransport::new(reqwest::Client::new())),
        Arc::new(EnvCredentials),
    );
    let orchestrator = VisionOrchestrator::new(
        PathResolver::new(config.project_root.clone()),
        Arc::new(PdfMaterializer::new(config.render_scale)),
        client,
        Arc::new(MemoryResultCache::new(config.cache_capacity)),
        config.provider.clone(),
    );

    let state = AppState {
        vision: Arc::new(orchestrator),
    };

    let app = Router::new()
        .route("/health", get(health))
        .route("/vision", post(analyze))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.addr).await?;
    info!("Server listening on http://{}", config.addr);
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Handlers
// ============================================================================

/// Health check endpoint.
async fn health() -> &'static str {
    "ok"
}

/// Run the vision pipeline for one page or embedded image.
async fn analyze(
    State(state): State<AppState>,
    Json(body): Json<serde_json::Value>,
) -> Result<Json<OcrResult>, (StatusCode, String)> {
    let args = VisionArgs::from_value(body).map_err(into_response)?;
    let result = state.vision.get_vision_result(args).await.map_err(|e| {
        error!("Vision request failed: {}", e);
        into_response(e)
    })?;
    Ok(Json(result))
}

fn into_response(err: VisionError) -> (StatusCode, String) {
    (status_for(&err), err.to_string())
}

fn status_for(err: &VisionError) -> StatusCode {
    match err {
        VisionError::InvalidArgument(_) => StatusCode::BAD_REQUEST,
        VisionError::MissingCredential { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        VisionError::SourceResolution(_) => StatusCode::UNPROCESSABLE_ENTITY,
        VisionError::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
        VisionError::ProviderTransport(_) | VisionError::ProviderResponse { .. } => {
            StatusCode::BAD_GATEWAY
        }
    }
}
