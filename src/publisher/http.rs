use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;
use serde::Deserialize;
use std::path::Path;
use tracing::debug;

use super::{ArtifactPublisher, PublishError, DESCRIPTION_TAG};
use crate::config::StorageConfig;

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36";

/// Object store reachable over HTTP.
///
/// Files are sent as a multipart `POST` authenticated with the account's
/// basic credentials. The store answers with `{ "link": "..." }`.
pub struct HttpObjectStore {
    client: reqwest::Client,
    endpoint: String,
    email: String,
    password: String,
}

#[derive(Debug, Deserialize)]
struct UploadReply {
    link: Option<String>,
}

impl HttpObjectStore {
    pub fn new(config: &StorageConfig) -> Result<Self, PublishError> {
        let mut builder = reqwest::Client::builder().user_agent(USER_AGENT);
        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        Ok(Self {
            client: builder.build()?,
            endpoint: config.endpoint.clone(),
            email: config.email.clone(),
            password: config.password.clone(),
        })
    }
}

#[async_trait::async_trait]
impl ArtifactPublisher for HttpObjectStore {
    fn kind(&self) -> &'static str {
        "http"
    }

    async fn upload(&self, path: &Path, display_name: &str) -> Result<String, PublishError> {
        let bytes = tokio::fs::read(path).await?;
        debug!("Uploading {} ({} bytes) to {}", display_name, bytes.len(), self.endpoint);

        let file = Part::bytes(bytes)
            .file_name(display_name.to_string())
            .mime_str("application/json")?;
        let form = Form::new()
            .text("name", display_name.to_string())
            .text("description", DESCRIPTION_TAG)
            .part("file", file);

        let response = self
            .client
            .post(&self.endpoint)
            .basic_auth(&self.email, Some(&self.password))
            .multipart(form)
            .send()
            .await?;

        match response.status() {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => return Err(PublishError::Auth),
            StatusCode::PAYLOAD_TOO_LARGE | StatusCode::INSUFFICIENT_STORAGE => {
                return Err(PublishError::Quota)
            }
            status if !status.is_success() => {
                return Err(PublishError::Rejected {
                    status: status.as_u16(),
                })
            }
            _ => {}
        }

        let reply: UploadReply = response
            .json()
            .await
            .map_err(|e| PublishError::InvalidResponse(e.to_string()))?;

        reply
            .link
            .filter(|link| !link.is_empty())
            .ok_or_else(|| PublishError::InvalidResponse("missing link".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StorageProvider;
    use axum::{
        extract::Multipart,
        http::{header::AUTHORIZATION, HeaderMap, StatusCode as AxumStatus},
        response::IntoResponse,
        routing::post,
        Json, Router,
    };
    use tokio::net::TcpListener;

    // base64("bot@example.com:secret")
    const EXPECTED_AUTH: &str = "Basic Ym90QGV4YW1wbGUuY29tOnNlY3JldA==";

    async fn fake_store(headers: HeaderMap, mut multipart: Multipart) -> impl IntoResponse {
        let mut name = None;
        let mut description = None;
        let mut file_len = 0;
        while let Some(field) = multipart.next_field().await.unwrap() {
            let field_name = field.name().map(str::to_string);
            match field_name.as_deref() {
                Some("name") => name = Some(field.text().await.unwrap()),
                Some("description") => description = Some(field.text().await.unwrap()),
                Some("file") => file_len = field.bytes().await.unwrap().len(),
                _ => {}
            }
        }

        if headers.get(AUTHORIZATION).and_then(|h| h.to_str().ok()) != Some(EXPECTED_AUTH) {
            return (AxumStatus::UNAUTHORIZED, Json(serde_json::json!({}))).into_response();
        }

        if description.as_deref() != Some(DESCRIPTION_TAG) || file_len == 0 {
            return (AxumStatus::BAD_REQUEST, Json(serde_json::json!({}))).into_response();
        }

        Json(serde_json::json!({
            "link": format!("https://storage.example.com/file/{}", name.unwrap_or_default())
        }))
        .into_response()
    }

    async fn spawn_store(app: Router) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{}/upload", addr)
    }

    fn store_config(endpoint: String, password: &str) -> StorageConfig {
        StorageConfig {
            provider: StorageProvider::Http,
            endpoint,
            email: "bot@example.com".to_string(),
            password: password.to_string(),
            timeout: Some(std::time::Duration::from_secs(5)),
        }
    }

    fn artifact_file() -> (tempfile::TempDir, std::path::PathBuf) {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("creds_15551234567_1.json");
        std::fs::write(&path, r#"{"userNumber":"15551234567"}"#).unwrap();
        (dir, path)
    }

    #[tokio::test]
    async fn test_upload_returns_remote_link() {
        let endpoint = spawn_store(Router::new().route("/upload", post(fake_store))).await;
        let store = HttpObjectStore::new(&store_config(endpoint, "secret")).unwrap();
        let (_dir, path) = artifact_file();

        let link = store.upload(&path, "creds_15551234567_1.json").await.unwrap();
        assert_eq!(link, "https://storage.example.com/file/creds_15551234567_1.json");
    }

    #[tokio::test]
    async fn test_upload_bad_credentials() {
        let endpoint = spawn_store(Router::new().route("/upload", post(fake_store))).await;
        let store = HttpObjectStore::new(&store_config(endpoint, "wrong")).unwrap();
        let (_dir, path) = artifact_file();

        let result = store.upload(&path, "creds.json").await;
        assert!(matches!(result, Err(PublishError::Auth)));
    }

    #[tokio::test]
    async fn test_upload_quota_exceeded() {
        let app = Router::new().route(
            "/upload",
            post(|_body: axum::body::Bytes| async { AxumStatus::INSUFFICIENT_STORAGE }),
        );
        let endpoint = spawn_store(app).await;
        let store = HttpObjectStore::new(&store_config(endpoint, "secret")).unwrap();
        let (_dir, path) = artifact_file();

        let result = store.upload(&path, "creds.json").await;
        assert!(matches!(result, Err(PublishError::Quota)));
    }

    #[tokio::test]
    async fn test_upload_missing_link() {
        let app = Router::new().route(
            "/upload",
            post(|_body: axum::body::Bytes| async { Json(serde_json::json!({ "ok": true })) }),
        );
        let endpoint = spawn_store(app).await;
        let store = HttpObjectStore::new(&store_config(endpoint, "secret")).unwrap();
        let (_dir, path) = artifact_file();

        let result = store.upload(&path, "creds.json").await;
        assert!(matches!(result, Err(PublishError::InvalidResponse(_))));
    }

    #[tokio::test]
    async fn test_upload_unreachable_store() {
        // Bind then drop to get a port nothing listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let store =
            HttpObjectStore::new(&store_config(format!("http://{}/upload", addr), "secret")).unwrap();
        let (_dir, path) = artifact_file();

        let result = store.upload(&path, "creds.json").await;
        assert!(matches!(result, Err(PublishError::Network(_))));
    }

    #[tokio::test]
    async fn test_upload_missing_file() {
        let store = HttpObjectStore::new(&store_config(
            "http://127.0.0.1:9/upload".to_string(),
            "secret",
        ))
        .unwrap();

        let result = store
            .upload(Path::new("/nonexistent/creds.json"), "creds.json")
            .await;
        assert!(matches!(result, Err(PublishError::Io(_))));
    }
}
