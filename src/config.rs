//! Runtime configuration, loaded once from the environment at startup.

use anyhow::{Context, Result};
use std::env;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Which remote object store the publisher talks to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageProvider {
    Http,
    None,
}

impl std::fmt::Display for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StorageProvider::Http => write!(f, "http"),
            StorageProvider::None => write!(f, "none"),
        }
    }
}

impl FromStr for StorageProvider {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "http" => Ok(StorageProvider::Http),
            "none" | "" => Ok(StorageProvider::None),
            _ => Err(format!("Invalid storage provider: {}", s)),
        }
    }
}

/// Remote storage account. The password never shows up in Debug output.
#[derive(Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    pub endpoint: String,
    pub email: String,
    pub password: String,
    pub timeout: Option<Duration>,
}

impl std::fmt::Debug for StorageConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StorageConfig")
            .field("provider", &self.provider)
            .field("endpoint", &self.endpoint)
            .field("email", &self.email)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            provider: StorageProvider::None,
            endpoint: String::new(),
            email: String::new(),
            password: String::new(),
            timeout: None,
        }
    }
}

/// Generated artifact handling
#[derive(Debug, Clone)]
pub struct ArtifactConfig {
    pub artifact_dir: PathBuf,
    pub retention: chrono::Duration,
    pub sweep_interval: Duration,
    /// Overrides the scheme and host taken from the request when building
    /// local download links
    pub public_base_url: Option<String>,
}

impl Default for ArtifactConfig {
    fn default() -> Self {
        Self {
            artifact_dir: PathBuf::from("temp"),
            retention: chrono::Duration::hours(1),
            sweep_interval: Duration::from_secs(60),
            public_base_url: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub db_path: String,
    pub public_dir: PathBuf,
    /// Exposes internal error details in 500 responses
    pub diagnostics: bool,
    pub artifacts: ArtifactConfig,
    pub storage: StorageConfig,
}

impl Config {
    /// Load configuration from environment variables, honoring a `.env` file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = ArtifactConfig::default();

        let port = parse_or(&lookup, "PORT", 3000u16)?;
        let retention_secs = parse_or(
            &lookup,
            "WEBPAIR_RETENTION_SECS",
            defaults.retention.num_seconds(),
        )?;
        let retention = retention_from_secs(retention_secs)?;

        let sweep_secs = parse_or(
            &lookup,
            "WEBPAIR_SWEEP_INTERVAL_SECS",
            defaults.sweep_interval.as_secs(),
        )?;
        if sweep_secs == 0 {
            anyhow::bail!("WEBPAIR_SWEEP_INTERVAL_SECS must be greater than zero");
        }

        let provider: StorageProvider = lookup("WEBPAIR_STORAGE_PROVIDER")
            .unwrap_or_else(|| "none".to_string())
            .parse()
            .map_err(|e: String| anyhow::anyhow!(e))?;

        let storage = match provider {
            StorageProvider::None => StorageConfig::default(),
            StorageProvider::Http => StorageConfig {
                provider,
                endpoint: lookup("WEBPAIR_STORAGE_URL")
                    .ok_or_else(|| anyhow::anyhow!("WEBPAIR_STORAGE_URL is required"))?,
                email: lookup("WEBPAIR_STORAGE_EMAIL")
                    .ok_or_else(|| anyhow::anyhow!("WEBPAIR_STORAGE_EMAIL is required"))?,
                password: lookup("WEBPAIR_STORAGE_PASSWORD")
                    .ok_or_else(|| anyhow::anyhow!("WEBPAIR_STORAGE_PASSWORD is required"))?,
                timeout: match lookup("WEBPAIR_STORAGE_TIMEOUT_SECS") {
                    Some(raw) => Some(Duration::from_secs(
                        raw.parse()
                            .with_context(|| format!("Invalid WEBPAIR_STORAGE_TIMEOUT_SECS: {}", raw))?,
                    )),
                    None => None,
                },
            },
        };

        Ok(Self {
            port,
            db_path: lookup("WEBPAIR_DB_PATH").unwrap_or_else(|| "webpair.db".to_string()),
            public_dir: lookup("WEBPAIR_PUBLIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from("public")),
            diagnostics: lookup("WEBPAIR_ENV")
                .map(|v| v.eq_ignore_ascii_case("development"))
                .unwrap_or(false),
            artifacts: ArtifactConfig {
                artifact_dir: lookup("WEBPAIR_ARTIFACT_DIR")
                    .map(PathBuf::from)
                    .unwrap_or(defaults.artifact_dir),
                retention,
                sweep_interval: Duration::from_secs(sweep_secs),
                public_base_url: lookup("WEBPAIR_PUBLIC_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string()),
            },
            storage,
        })
    }
}

/// Retention must be non-negative and small enough that `now + retention`
/// stays representable for the lifetime of the process
fn retention_from_secs(secs: i64) -> Result<chrono::Duration> {
    let retention = chrono::Duration::try_seconds(secs)
        .filter(|r| *r >= chrono::Duration::zero())
        .ok_or_else(|| anyhow::anyhow!("WEBPAIR_RETENTION_SECS out of range: {}", secs))?;

    // Leave a year of headroom past today
    chrono::Utc::now()
        .checked_add_signed(chrono::Duration::days(366))
        .and_then(|t| t.checked_add_signed(retention))
        .ok_or_else(|| anyhow::anyhow!("WEBPAIR_RETENTION_SECS out of range: {}", secs))?;

    Ok(retention)
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid value for {}: {}", key, raw)),
        None => Ok(default),
    }
}
