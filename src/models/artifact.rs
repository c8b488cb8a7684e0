use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Artifact states matching the `artifacts.state` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "TEXT", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ArtifactState {
    Pending,
    PublishedRemote,
    PublishedLocal,
    Removed,
}

impl std::fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtifactState::Pending => write!(f, "pending"),
            ArtifactState::PublishedRemote => write!(f, "published_remote"),
            ArtifactState::PublishedLocal => write!(f, "published_local"),
            ArtifactState::Removed => write!(f, "removed"),
        }
    }
}

impl std::str::FromStr for ArtifactState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(ArtifactState::Pending),
            "published_remote" => Ok(ArtifactState::PublishedRemote),
            "published_local" => Ok(ArtifactState::PublishedLocal),
            "removed" => Ok(ArtifactState::Removed),
            _ => Err(format!("Invalid artifact state: {}", s)),
        }
    }
}

/// Generated credentials file tracked by the expiry index
#[derive(Debug, Clone)]
pub struct Artifact {
    pub filename: String,
    pub path: PathBuf,
    pub state: ArtifactState,
    pub remote_link: Option<String>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub removed_at: Option<DateTime<Utc>>,
}

impl Artifact {
    /// Whether the local copy may still be served
    pub fn is_servable(&self, now: DateTime<Utc>) -> bool {
        self.state != ArtifactState::Removed && self.expires_at > now
    }
}
