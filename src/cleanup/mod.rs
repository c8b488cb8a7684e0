//! Periodic removal of expired artifact files.
//!
//! Entries in the expiry index are visited once their retention window has
//! passed: the local file is deleted and the row is marked removed. The
//! first sweep runs at startup so files orphaned by a restart are reclaimed.

use chrono::Utc;
use std::io::ErrorKind;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::db::ArtifactRepository;

/// Outcome of a single sweep
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepResult {
    pub removed: usize,
    pub already_gone: usize,
    pub failed: usize,
}

/// Delete every expired artifact file and mark its entry removed
pub async fn sweep_once(repo: &ArtifactRepository) -> Result<SweepResult, sqlx::Error> {
    let expired = repo.get_expired(Utc::now()).await?;
    let mut result = SweepResult::default();

    for artifact in expired {
        match tokio::fs::remove_file(&artifact.path).await {
            Ok(()) => {
                info!("Cleaned up temp file: {}", artifact.filename);
                result.removed += 1;
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("Temp file {} already removed", artifact.filename);
                result.already_gone += 1;
            }
            Err(e) => {
                // Left in the index so the next sweep retries
                warn!("Failed to remove temp file {}: {}", artifact.filename, e);
                result.failed += 1;
                continue;
            }
        }

        repo.mark_removed(&artifact.filename).await?;
    }

    Ok(result)
}

/// Run `sweep_once` now and then on every `interval` tick
pub fn spawn(repo: Arc<ArtifactRepository>, interval: Duration) -> JoinHandle<()> {
    info!("Starting artifact sweeper with interval {:?}", interval);

    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match sweep_once(&repo).await {
                Ok(result) if result != SweepResult::default() => info!(
                    "Sweep completed - removed: {}, already gone: {}, failed: {}",
                    result.removed, result.already_gone, result.failed
                ),
                Ok(_) => {}
                Err(e) => error!("Artifact sweep failed: {}", e),
            }
        }
    })
}

/// Why the sweeper task ended. The loop never returns on its own, so any
/// of these means expired files are no longer being removed.
#[derive(Debug, thiserror::Error)]
pub enum SweeperStopped {
    #[error("artifact sweeper panicked: {0}")]
    Panicked(String),
    #[error("artifact sweeper was cancelled")]
    Cancelled,
    #[error("artifact sweeper exited")]
    Exited,
}

/// Wait for the sweeper task to end and log why
pub async fn stopped(handle: JoinHandle<()>) -> SweeperStopped {
    let reason = match handle.await {
        Ok(()) => SweeperStopped::Exited,
        Err(e) if e.is_panic() => {
            let payload = e.into_panic();
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            SweeperStopped::Panicked(message)
        }
        Err(_) => SweeperStopped::Cancelled,
    };

    error!("{}", reason);
    reason
}
