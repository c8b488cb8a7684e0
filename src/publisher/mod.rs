//! Publishing generated artifacts to a remote object store.
//!
//! Exactly one upload attempt is made per artifact. Any failure falls back
//! to serving the file locally for the rest of its retention window.

mod http;

pub use http::HttpObjectStore;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{StorageConfig, StorageProvider};

/// Description attached to every remote upload
pub const DESCRIPTION_TAG: &str = "TUNZYMD Session File";

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Remote storage is not configured")]
    Unavailable,
    #[error("Remote storage rejected the account credentials")]
    Auth,
    #[error("Remote storage quota exceeded")]
    Quota,
    #[error("Remote storage request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Remote storage rejected the upload with status {status}")]
    Rejected { status: u16 },
    #[error("Remote storage returned an unusable response: {0}")]
    InvalidResponse(String),
    #[error("Failed to read artifact: {0}")]
    Io(#[from] std::io::Error),
}

/// Where a published artifact can be fetched from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PublishResult {
    /// Durable link on the remote store
    RemotePublished(String),
    /// Only the local copy exists; served by the download route until it expires
    LocalFallback(PathBuf),
}

/// Remote object store capable of hosting an artifact file
#[async_trait::async_trait]
pub trait ArtifactPublisher: Send + Sync {
    /// Short name for logs
    fn kind(&self) -> &'static str;

    /// Upload `path` under `display_name` and return a publicly resolvable link
    async fn upload(&self, path: &Path, display_name: &str) -> Result<String, PublishError>;
}

/// Publish an artifact, falling back to the local copy on any failure
pub async fn publish(
    publisher: &dyn ArtifactPublisher,
    path: &Path,
    display_name: &str,
) -> PublishResult {
    match publisher.upload(path, display_name).await {
        Ok(link) => {
            info!("Published {} to {}: {}", display_name, publisher.kind(), link);
            PublishResult::RemotePublished(link)
        }
        Err(PublishError::Unavailable) => PublishResult::LocalFallback(path.to_path_buf()),
        Err(e) => {
            warn!(
                "Remote upload of {} failed, using local download: {}",
                display_name, e
            );
            PublishResult::LocalFallback(path.to_path_buf())
        }
    }
}

/// Publisher used when no remote store is configured
pub struct DisabledPublisher;

#[async_trait::async_trait]
impl ArtifactPublisher for DisabledPublisher {
    fn kind(&self) -> &'static str {
        "none"
    }

    async fn upload(&self, _path: &Path, _display_name: &str) -> Result<String, PublishError> {
        Err(PublishError::Unavailable)
    }
}

/// Build the publisher selected by configuration
pub fn create_publisher(config: &StorageConfig) -> Result<Arc<dyn ArtifactPublisher>, PublishError> {
    match config.provider {
        StorageProvider::Http => {
            info!("Creating HTTP object store publisher for {}", config.endpoint);
            Ok(Arc::new(HttpObjectStore::new(config)?))
        }
        StorageProvider::None => {
            info!("Remote storage disabled, artifacts are served locally");
            Ok(Arc::new(DisabledPublisher))
        }
    }
}
