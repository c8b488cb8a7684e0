use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use tracing::info;

#[derive(Clone)]
pub struct DbPool(SqlitePool);

impl DbPool {
    pub async fn new(db_path: &str) -> Result<Self, sqlx::Error> {
        let options = SqliteConnectOptions::from_str(&format!("sqlite:{}", db_path))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new().connect_with(options).await?;
        Ok(Self(pool))
    }

    pub fn inner(&self) -> &SqlitePool {
        &self.0
    }
}

pub async fn run_migrations(pool: &DbPool) -> Result<(), sqlx::Error> {
    info!("Running database migrations");

    sqlx::query(CREATE_ARTIFACTS).execute(pool.inner()).await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_artifacts_expiry ON artifacts (state, expires_at)",
    )
    .execute(pool.inner())
    .await?;

    info!("Database migrations completed");
    Ok(())
}

pub(crate) const CREATE_ARTIFACTS: &str = r#"
    CREATE TABLE IF NOT EXISTS artifacts (
        filename TEXT PRIMARY KEY,
        path TEXT NOT NULL,
        state TEXT NOT NULL CHECK (state IN ('pending', 'published_remote', 'published_local', 'removed')),
        remote_link TEXT,
        created_at TEXT NOT NULL,
        expires_at TEXT NOT NULL,
        removed_at TEXT
    )
"#;
