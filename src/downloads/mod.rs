use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::io::ErrorKind;
use tokio_util::io::ReaderStream;
use tracing::{error, warn};

use crate::AppState;

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/:filename", axum::routing::get(download_artifact))
}

#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("File not found or expired")]
    NotFound,
    #[error("Download failed")]
    Failed(#[source] std::io::Error),
}

impl IntoResponse for DownloadError {
    fn into_response(self) -> Response {
        let status = match &self {
            DownloadError::NotFound => StatusCode::NOT_FOUND,
            DownloadError::Failed(e) => {
                error!("Download failed: {}", e);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (status, Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}

/// GET /download/:filename
/// Stream a generated session file while its retention window lasts
async fn download_artifact(
    State(state): State<AppState>,
    Path(filename): Path<String>,
) -> Result<Response, DownloadError> {
    if !is_plain_filename(&filename) {
        return Err(DownloadError::NotFound);
    }

    // The index decides expiry even if the sweeper has not run yet
    match state.artifact_repo.get(&filename).await {
        Ok(Some(artifact)) if !artifact.is_servable(chrono::Utc::now()) => {
            return Err(DownloadError::NotFound)
        }
        Ok(_) => {}
        Err(e) => warn!("Failed to look up artifact {}: {}", filename, e),
    }

    let path = state.artifact_config.artifact_dir.join(&filename);
    let file = match tokio::fs::File::open(&path).await {
        Ok(file) => file,
        Err(e) if e.kind() == ErrorKind::NotFound => return Err(DownloadError::NotFound),
        Err(e) => return Err(DownloadError::Failed(e)),
    };
    let len = file.metadata().await.map_err(DownloadError::Failed)?.len();

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                "attachment; filename=\"creds.json\"".to_string(),
            ),
            (header::CONTENT_LENGTH, len.to_string()),
        ],
        Body::from_stream(ReaderStream::new(file)),
    )
        .into_response())
}

/// A single path component that cannot escape the artifact directory
fn is_plain_filename(name: &str) -> bool {
    !name.is_empty()
        && name != "."
        && !name.contains("..")
        && !name.contains('/')
        && !name.contains('\\')
        && !name.contains('\0')
}
