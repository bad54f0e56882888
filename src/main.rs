//! Chest X-ray Pneumonia Detection Server
//!
//! Accepts an uploaded chest X-ray, runs it through a CNN feature extractor
//! and a boosted classifier, stores the result and answers as HTML or JSON.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    XRAY PREDICT                             │
//! ├─────────────────────────────────────────────────────────────┤
//! │  ┌───────────┐  ┌──────────────┐  ┌──────────────────────┐ │
//! │  │  HTTP     │  │  Inference   │  │  Decision Policy     │ │
//! │  │  (Axum)   │─▶│  CNN → GBM   │─▶│  record + review     │ │
//! │  │           │  │  (ONNX)      │  │  archive             │ │
//! │  └─────┬─────┘  └──────────────┘  └──────────┬───────────┘ │
//! │        ▼                                     ▼              │
//! │  ┌─────────────┐                     ┌─────────────┐       │
//! │  │ Media files │                     │   SQLite    │       │
//! │  └─────────────┘                     └─────────────┘       │
//! └─────────────────────────────────────────────────────────────┘
//! ```

mod config;
mod db;
mod error;
mod handlers;
mod inference;
mod models;
mod policy;
mod storage;
mod views;

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use axum::{
    extract::DefaultBodyLimit,
    routing::{any, get, post},
    Router,
};
use sqlx::SqlitePool;
use tower_http::{
    compression::CompressionLayer,
    cors::{Any, CorsLayer},
    services::ServeDir,
    trace::TraceLayer,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use inference::{InferencePipeline, ModelRegistry, OnnxModelLoader, ThresholdConfig};
use policy::DecisionPolicy;
use storage::{MediaStorage, ReviewArchive};

pub use error::{AppError, AppResult};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration
    dotenvy::dotenv().ok();
    let config = config::Config::from_env();

    // Initialize logging (JSON lines in production)
    let production = config.is_production();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| "xray_predict=debug,tower_http=debug".into()))
        .with(production.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!production).then(|| tracing_subscriber::fmt::layer()))
        .init();

    tracing::info!("X-ray prediction server starting ({})...", config.environment);
    tracing::info!("Database: {}", config.database_url);
    tracing::info!("Using MEDIA_ROOT: {}", config.media_root.display());

    std::fs::create_dir_all(config.review_dir())
        .with_context(|| format!("Failed to create media root {}", config.media_root.display()))?;

    // Initialize database pool
    let pool = db::create_pool(&config.database_url).await
        .context("Failed to create database pool")?;

    // Run migrations
    tracing::info!("Running database migrations...");
    db::run_migrations(&pool).await
        .context("Failed to run migrations")?;

    // Load models eagerly; a failure leaves the server up and answering 500
    let thresholds = ThresholdConfig::default();
    let registry = Arc::new(ModelRegistry::new(OnnxModelLoader {
        feature_model_path: config.feature_model_path.clone(),
        classifier_model_path: config.classifier_model_path.clone(),
        thresholds,
    }));
    {
        let registry = registry.clone();
        tokio::task::spawn_blocking(move || registry.ensure_loaded())
            .await
            .context("Model loading task panicked")?;
    }
    let status = registry.status();
    if status.is_ready() {
        tracing::info!("Models ready");
    } else {
        tracing::warn!("Model loading failed (server will still run): {:?}", status);
    }

    // Build application state
    let state = AppState::new(config.clone(), pool, registry, thresholds);

    // Build router
    let app = create_router(state);

    // Start server
    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    tracing::info!("🚀 Server listening on http://{}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await
        .context("Server error")?;

    Ok(())
}

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub pool: SqlitePool,
    pub config: config::Config,
    pub pipeline: InferencePipeline,
    pub storage: MediaStorage,
    pub policy: DecisionPolicy,
}

impl AppState {
    pub fn new(
        config: config::Config,
        pool: SqlitePool,
        registry: Arc<ModelRegistry>,
        thresholds: ThresholdConfig,
    ) -> Self {
        let storage = MediaStorage::new(config.media_root.clone(), config.media_url.clone());
        let archive = ReviewArchive::new(config.review_dir());
        let policy = DecisionPolicy::new(pool.clone(), archive, thresholds);

        Self {
            pool,
            pipeline: InferencePipeline::new(registry),
            storage,
            policy,
            config,
        }
    }
}

/// Create the main router with all routes
fn create_router(state: AppState) -> Router {
    let media_prefix = state.config.media_url.trim_end_matches('/').to_string();
    let media = ServeDir::new(&state.config.media_root);

    let router = Router::new()
        // Pages
        .route("/", get(handlers::pages::home))
        .route("/predict/", any(handlers::predict::predict))
        .route("/predict", any(handlers::predict::predict))

        // Status
        .route("/health", get(handlers::health::check))

        // History
        .route("/api/v1/predictions", get(handlers::predictions::list))
        .route("/api/v1/predictions/stats", get(handlers::predictions::stats))
        .route("/api/v1/predictions/:id", get(handlers::predictions::get))

        // Models
        .route("/api/v1/models/reload", post(handlers::models::reload));

    // Uploaded images
    let router = if media_prefix.is_empty() {
        router.fallback_service(media)
    } else {
        router.nest_service(&media_prefix, media)
    };

    router
        .layer(DefaultBodyLimit::max(state.config.max_upload_bytes))
        .layer(CompressionLayer::new())
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any)
        )
        .with_state(state)
}
