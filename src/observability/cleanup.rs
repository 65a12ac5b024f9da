//! Background retention task for request/response logs
//!
//! Periodically deletes rows older than the configured TTL.

use super::database::LogDb;
use super::records::CleanupStats;
use anyhow::Result;
use std::time::Duration;
use tokio::time;

/// Cleanup configuration
#[derive(Debug, Clone, Copy)]
pub struct CleanupConfig {
    /// Rows older than this many days are deleted
    pub retention_days: u32,

    /// How often the retention pass runs
    pub check_interval: Duration,
}

impl CleanupConfig {
    pub fn new(retention_days: u32) -> Self {
        Self {
            retention_days,
            check_interval: Duration::from_secs(3600), // Check every hour
        }
    }
}

/// Spawn background cleanup task
///
/// # Example
///
/// ```ignore
/// spawn_cleanup_task(db.clone(), CleanupConfig::new(30));
/// ```
pub fn spawn_cleanup_task(db: LogDb, config: CleanupConfig) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        cleanup_loop(db, config).await;
    })
}

async fn cleanup_loop(db: LogDb, config: CleanupConfig) {
    let mut interval = time::interval(config.check_interval);

    loop {
        interval.tick().await;

        match run_cleanup_now(&db, config.retention_days).await {
            Ok(stats) => {
                if stats.requests_deleted > 0 || stats.responses_deleted > 0 {
                    tracing::info!(
                        retention_days = config.retention_days,
                        requests_deleted = stats.requests_deleted,
                        responses_deleted = stats.responses_deleted,
                        "Cleaned up old log rows"
                    );
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "Scheduled log cleanup failed");
            }
        }
    }
}

/// Run a retention pass immediately
pub async fn run_cleanup_now(db: &LogDb, retention_days: u32) -> Result<CleanupStats> {
    let cutoff = chrono::Utc::now() - chrono::Duration::days(i64::from(retention_days));
    db.delete_older_than(cutoff).await
}
