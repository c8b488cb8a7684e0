use crate::models::{Artifact, ArtifactState};
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqlitePool;
use std::path::{Path, PathBuf};
use tracing::info;

/// Expiry index for generated artifact files.
///
/// Rows outlive the process, so files left behind by a restart are still
/// reclaimed by the next sweep.
pub struct ArtifactRepository {
    pool: SqlitePool,
}

impl ArtifactRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Get an artifact by file name
    pub async fn get(&self, filename: &str) -> Result<Option<Artifact>, sqlx::Error> {
        let row = sqlx::query_as::<_, ArtifactRow>(
            "SELECT filename, path, state, remote_link, created_at, expires_at, removed_at FROM artifacts WHERE filename = ?",
        )
        .bind(filename)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(|r| r.into_artifact()))
    }

    /// Register a freshly written file that must be gone by `expires_at`
    pub async fn create(
        &self,
        filename: &str,
        path: &Path,
        expires_at: DateTime<Utc>,
    ) -> Result<Artifact, sqlx::Error> {
        sqlx::query(
            "INSERT INTO artifacts (filename, path, state, created_at, expires_at) VALUES (?, ?, 'pending', ?, ?)",
        )
        .bind(filename)
        .bind(path.to_string_lossy().into_owned())
        .bind(format_ts(Utc::now()))
        .bind(format_ts(expires_at))
        .execute(&self.pool)
        .await?;

        self.get(filename).await?.ok_or(sqlx::Error::RowNotFound)
    }

    /// Record where the artifact ended up after the publish attempt
    pub async fn mark_published(
        &self,
        filename: &str,
        remote_link: Option<&str>,
    ) -> Result<(), sqlx::Error> {
        let state = match remote_link {
            Some(_) => ArtifactState::PublishedRemote,
            None => ArtifactState::PublishedLocal,
        };

        sqlx::query(
            "UPDATE artifacts SET state = ?, remote_link = ? WHERE filename = ? AND state = 'pending'",
        )
        .bind(state.to_string())
        .bind(remote_link)
        .bind(filename)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Artifacts past their expiry whose local file has not been removed yet
    pub async fn get_expired(&self, now: DateTime<Utc>) -> Result<Vec<Artifact>, sqlx::Error> {
        let rows = sqlx::query_as::<_, ArtifactRow>(
            "SELECT filename, path, state, remote_link, created_at, expires_at, removed_at
             FROM artifacts
             WHERE expires_at <= ? AND state != 'removed'
             ORDER BY expires_at",
        )
        .bind(format_ts(now))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(|r| r.into_artifact()).collect())
    }

    /// Mark the local file as removed
    pub async fn mark_removed(&self, filename: &str) -> Result<(), sqlx::Error> {
        sqlx::query("UPDATE artifacts SET state = 'removed', removed_at = ? WHERE filename = ?")
            .bind(format_ts(Utc::now()))
            .bind(filename)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Drop the entry so the sweeper never visits it.
    /// Returns false if there was nothing to cancel.
    pub async fn cancel(&self, filename: &str) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM artifacts WHERE filename = ? AND state != 'removed'")
            .bind(filename)
            .execute(&self.pool)
            .await?;

        let cancelled = result.rows_affected() > 0;
        if cancelled {
            info!("Cancelled scheduled removal of {}", filename);
        }
        Ok(cancelled)
    }
}

/// Fixed-width UTC timestamps so that text comparison in SQL orders correctly
fn format_ts(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Raw database row for artifacts
#[derive(sqlx::FromRow)]
struct ArtifactRow {
    filename: String,
    path: String,
    state: String,
    remote_link: Option<String>,
    created_at: String,
    expires_at: String,
    removed_at: Option<String>,
}

impl ArtifactRow {
    fn into_artifact(self) -> Artifact {
        Artifact {
            filename: self.filename,
            path: PathBuf::from(self.path),
            state: self.state.parse().unwrap_or(ArtifactState::Pending),
            remote_link: self.remote_link,
            created_at: parse_datetime(&self.created_at),
            // An unreadable expiry is treated as already expired
            expires_at: parse_datetime_opt(&self.expires_at).unwrap_or(DateTime::<Utc>::MIN_UTC),
            removed_at: self.removed_at.and_then(|s| parse_datetime_opt(&s)),
        }
    }
}

fn parse_datetime(s: &str) -> DateTime<Utc> {
    parse_datetime_opt(s).unwrap_or_else(Utc::now)
}

fn parse_datetime_opt(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use sqlx::sqlite::SqlitePoolOptions;

    async fn create_test_pool() -> SqlitePool {
        // A single connection keeps every query on the same in-memory database
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();

        sqlx::query(crate::db::pool::CREATE_ARTIFACTS)
            .execute(&pool)
            .await
            .unwrap();

        pool
    }

    #[tokio::test]
    async fn test_create_artifact() {
        let repo = ArtifactRepository::new(create_test_pool().await);
        let expires_at = Utc::now() + Duration::hours(1);

        let artifact = repo
            .create("creds_1555_1.json", Path::new("/tmp/creds_1555_1.json"), expires_at)
            .await
            .unwrap();

        assert_eq!(artifact.filename, "creds_1555_1.json");
        assert_eq!(artifact.state, ArtifactState::Pending);
        assert_eq!(artifact.path, PathBuf::from("/tmp/creds_1555_1.json"));
        assert!(artifact.remote_link.is_none());
    }

    #[tokio::test]
    async fn test_duplicate_filename_rejected() {
        let repo = ArtifactRepository::new(create_test_pool().await);
        let expires_at = Utc::now() + Duration::hours(1);

        repo.create("dup.json", Path::new("/tmp/dup.json"), expires_at)
            .await
            .unwrap();
        assert!(repo
            .create("dup.json", Path::new("/tmp/dup.json"), expires_at)
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_mark_published() {
        let repo = ArtifactRepository::new(create_test_pool().await);
        let expires_at = Utc::now() + Duration::hours(1);

        repo.create("a.json", Path::new("/tmp/a.json"), expires_at).await.unwrap();
        repo.create("b.json", Path::new("/tmp/b.json"), expires_at).await.unwrap();

        repo.mark_published("a.json", Some("https://storage.example.com/f/a"))
            .await
            .unwrap();
        repo.mark_published("b.json", None).await.unwrap();

        let a = repo.get("a.json").await.unwrap().unwrap();
        assert_eq!(a.state, ArtifactState::PublishedRemote);
        assert_eq!(a.remote_link.as_deref(), Some("https://storage.example.com/f/a"));

        let b = repo.get("b.json").await.unwrap().unwrap();
        assert_eq!(b.state, ArtifactState::PublishedLocal);
    }

    #[tokio::test]
    async fn test_get_expired_and_mark_removed() {
        let repo = ArtifactRepository::new(create_test_pool().await);
        let now = Utc::now();

        repo.create("old.json", Path::new("/tmp/old.json"), now - Duration::seconds(5))
            .await
            .unwrap();
        repo.create("new.json", Path::new("/tmp/new.json"), now + Duration::hours(1))
            .await
            .unwrap();

        let expired = repo.get_expired(now).await.unwrap();
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].filename, "old.json");

        repo.mark_removed("old.json").await.unwrap();
        assert!(repo.get_expired(now).await.unwrap().is_empty());

        let old = repo.get("old.json").await.unwrap().unwrap();
        assert_eq!(old.state, ArtifactState::Removed);
        assert!(old.removed_at.is_some());
    }

    #[tokio::test]
    async fn test_cancel() {
        let repo = ArtifactRepository::new(create_test_pool().await);
        let past = Utc::now() - Duration::seconds(1);

        repo.create("c.json", Path::new("/tmp/c.json"), past).await.unwrap();
        assert!(repo.cancel("c.json").await.unwrap());
        assert!(repo.get_expired(Utc::now()).await.unwrap().is_empty());
        assert!(repo.get("c.json").await.unwrap().is_none());

        assert!(!repo.cancel("c.json").await.unwrap());
    }
}
