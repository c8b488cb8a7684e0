use axum::{response::IntoResponse, routing::get, Json, Router};
use serde::Serialize;
use std::future::IntoFuture;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::{services::ServeDir, trace::TraceLayer};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cleanup;
mod config;
mod db;
mod downloads;
mod models;
mod pairing;
mod publisher;

use config::{ArtifactConfig, Config};
use db::ArtifactRepository;
use publisher::ArtifactPublisher;

const SERVICE_NAME: &str = "tunzymd-webpair";

#[derive(Clone)]
pub struct AppState {
    artifact_repo: Arc<ArtifactRepository>,
    publisher: Arc<dyn ArtifactPublisher>,
    artifact_config: ArtifactConfig,
    diagnostics: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "tunzymd_webpair=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env()?;

    tokio::fs::create_dir_all(&config.artifacts.artifact_dir).await?;

    let db = db::init_db(&config.db_path).await?;
    info!("Database initialized");

    let artifact_repo = Arc::new(ArtifactRepository::new(db.inner().clone()));
    let publisher = publisher::create_publisher(&config.storage)?;
    info!("Remote storage publisher: {}", publisher.kind());

    let sweeper = cleanup::spawn(artifact_repo.clone(), config.artifacts.sweep_interval);

    let state = AppState {
        artifact_repo,
        publisher,
        artifact_config: config.artifacts.clone(),
        diagnostics: config.diagnostics,
    };

    let app = app(state, &config.public_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("{} listening on http://{}", SERVICE_NAME, addr);

    let listener = TcpListener::bind(addr).await?;

    // Without the sweeper nothing expires, so losing it stops the service
    tokio::select! {
        served = axum::serve(listener, app).into_future() => served?,
        reason = cleanup::stopped(sweeper) => return Err(reason.into()),
    }

    Ok(())
}

fn app(state: AppState, public_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health))
        .nest("/api", pairing::routes())
        .nest("/download", downloads::routes())
        .fallback_service(ServeDir::new(public_dir))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "online".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: models::credentials::iso_millis::format(&chrono::Utc::now()),
    })
}

#[derive(Serialize)]
struct HealthResponse {
    status: String,
    service: String,
    version: String,
    timestamp: String,
}

/// State backed by a sqlite file and an artifact directory under `dir`
#[cfg(test)]
async fn test_state(dir: &Path, publisher: Arc<dyn ArtifactPublisher>) -> AppState {
    let db = db::init_db(dir.join("test.db").to_str().unwrap())
        .await
        .unwrap();

    AppState {
        artifact_repo: Arc::new(ArtifactRepository::new(db.inner().clone())),
        publisher,
        artifact_config: ArtifactConfig {
            artifact_dir: dir.join("temp"),
            ..ArtifactConfig::default()
        },
        diagnostics: false,
    }
}
