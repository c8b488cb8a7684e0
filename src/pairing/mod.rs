mod message;

pub use message::TUTORIAL_LINK;

use axum::{
    extract::{rejection::JsonRejection, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};

use crate::models::credentials::{generate_session_id, now_millis, PAIRING_CODE};
use crate::models::{CredentialsRecord, PairRequest, PairResponse};
use crate::publisher::{self, PublishResult};
use crate::AppState;

/// Attempts at finding a free file name before giving up
const MAX_NAME_ATTEMPTS: i64 = 16;

pub fn routes() -> axum::Router<AppState> {
    axum::Router::new().route("/pair", axum::routing::post(pair))
}

#[derive(Debug, thiserror::Error)]
pub enum PairError {
    #[error("Please enter a valid phone number (minimum 10 digits)")]
    Validation,
    #[error("Failed to write session file: {0}")]
    Persistence(#[from] std::io::Error),
    #[error("Failed to register session file: {0}")]
    Index(#[from] sqlx::Error),
    #[error("Retention window does not fit after {0}")]
    Retention(chrono::DateTime<chrono::Utc>),
}

impl PairError {
    fn respond(self, diagnostics: bool) -> Response {
        match self {
            PairError::Validation => (
                StatusCode::BAD_REQUEST,
                Json(serde_json::json!({
                    "success": false,
                    "error": self.to_string()
                })),
            )
                .into_response(),
            e => {
                error!("Pairing error: {}", e);
                let mut body = serde_json::json!({
                    "success": false,
                    "error": "Failed to create session file"
                });
                if diagnostics {
                    body["details"] = serde_json::Value::String(e.to_string());
                }
                (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
            }
        }
    }
}

/// POST /api/pair
/// Generate a session file for a phone number and hand back a download link
async fn pair(
    State(state): State<AppState>,
    headers: HeaderMap,
    payload: Result<Json<PairRequest>, JsonRejection>,
) -> Response {
    let request = match payload {
        Ok(Json(request)) => request,
        Err(rejection) => {
            debug!("Rejected pairing body: {}", rejection);
            return PairError::Validation.respond(state.diagnostics);
        }
    };

    match create_session(&state, &headers, request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => e.respond(state.diagnostics),
    }
}

async fn create_session(
    state: &AppState,
    headers: &HeaderMap,
    request: PairRequest,
) -> Result<PairResponse, PairError> {
    let number = request.validated_number().ok_or(PairError::Validation)?;

    let generated_at = now_millis();
    let session_id = generate_session_id(generated_at);
    let record = CredentialsRecord::new(number, session_id.clone(), generated_at);

    let now = chrono::Utc::now();
    let expires_at = now
        .checked_add_signed(state.artifact_config.retention)
        .ok_or(PairError::Retention(now))?;

    let (filename, path) =
        write_artifact(&state.artifact_config.artifact_dir, number, &record).await?;

    if let Err(e) = state
        .artifact_repo
        .create(&filename, &path, expires_at)
        .await
    {
        // Unindexed files would never be swept
        if let Err(remove_err) = tokio::fs::remove_file(&path).await {
            warn!("Failed to remove unindexed file {}: {}", filename, remove_err);
        }
        return Err(PairError::Index(e));
    }

    let (download_link, remote_link) =
        match publisher::publish(state.publisher.as_ref(), &path, &filename).await {
            PublishResult::RemotePublished(link) => (link.clone(), Some(link)),
            PublishResult::LocalFallback(local) => {
                debug!("Serving {} locally", local.display());
                let link = format!("{}/download/{}", base_url(state, headers), filename);
                (link, None)
            }
        };

    if let Err(e) = state
        .artifact_repo
        .mark_published(&filename, remote_link.as_deref())
        .await
    {
        warn!("Failed to record publish outcome for {}: {}", filename, e);
    }

    info!("Created session file {} for session {}", filename, session_id);

    Ok(PairResponse {
        success: true,
        message: "Session file created successfully".to_string(),
        user_message: message::user_message(&download_link, number, &session_id, generated_at),
        download_link,
        session_id,
        pairing_code: PAIRING_CODE.to_string(),
        data: record,
        video_link: TUTORIAL_LINK.to_string(),
    })
}

/// `creds_<number>_<millis>.json`, with anything outside `[A-Za-z0-9+-]`
/// in the number replaced by `_`
fn artifact_filename(number: &str, millis: i64) -> String {
    let safe: String = number
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '+' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();
    format!("creds_{}_{}.json", safe, millis)
}

/// Write the record to a new file. An existing name is never overwritten;
/// the timestamp component is bumped until a free name is found.
async fn write_artifact(
    dir: &Path,
    number: &str,
    record: &CredentialsRecord,
) -> Result<(String, PathBuf), std::io::Error> {
    tokio::fs::create_dir_all(dir).await?;
    let body = serde_json::to_vec_pretty(record)?;

    let mut millis = record.generated_at.timestamp_millis();
    for _ in 0..MAX_NAME_ATTEMPTS {
        let filename = artifact_filename(number, millis);
        let path = dir.join(&filename);

        let mut file = match tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                millis += 1;
                continue;
            }
            Err(e) => return Err(e),
        };

        if let Err(e) = write_all(&mut file, &body).await {
            drop(file);
            let _ = tokio::fs::remove_file(&path).await;
            return Err(e);
        }
        return Ok((filename, path));
    }

    Err(std::io::Error::new(
        ErrorKind::AlreadyExists,
        format!("no free file name for {}", number),
    ))
}

async fn write_all(file: &mut tokio::fs::File, body: &[u8]) -> std::io::Result<()> {
    file.write_all(body).await?;
    file.flush().await?;
    file.sync_all().await
}

/// Scheme and host used for local download links
fn base_url(state: &AppState, headers: &HeaderMap) -> String {
    if let Some(base) = &state.artifact_config.public_base_url {
        return base.clone();
    }

    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or("http");
    let host = headers
        .get(axum::http::header::HOST)
        .and_then(|h| h.to_str().ok())
        .unwrap_or("localhost");

    format!("{}://{}", scheme, host)
}
