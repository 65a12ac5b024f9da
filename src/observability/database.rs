//! SQLite persistence for request/response logs
//!
//! This module provides async database operations with:
//! - Connection pooling (one connection per statement or transaction)
//! - Automatic migrations
//! - WAL mode for concurrent reads/writes

use crate::config::DatabaseConfig;
use crate::observability::records::{
    CleanupStats, LogStats, NewRequestLog, NewResponseLog, RequestLog, ResponseLog,
    ResponseStatus, TokenCounts,
};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::str::FromStr;
use std::time::Duration;

/// Write side of the log store, as used by the request handler
#[async_trait]
pub trait LogStore: Send + Sync + 'static {
    async fn create_request_log(&self, log: NewRequestLog) -> Result<RequestLog>;

    async fn create_response_log(&self, log: NewResponseLog) -> Result<ResponseLog>;

    /// Cheap liveness check used by the readiness endpoint
    async fn ping(&self) -> Result<()>;
}

/// Log database handle
///
/// Manages the SQLite connection pool and provides CRUD operations.
#[derive(Clone)]
pub struct LogDb {
    pool: SqlitePool,
}

impl LogDb {
    /// Connect with automatic migration
    ///
    /// # Example
    ///
    /// ```ignore
    /// let db = LogDb::connect(&DatabaseConfig::default()).await?;
    /// ```
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)
            .with_context(|| format!("Invalid database URL: {}", config.url))?
            .create_if_missing(true)
            .foreign_keys(true)
            .journal_mode(SqliteJournalMode::Wal) // Write-Ahead Logging for concurrency
            .busy_timeout(Duration::from_secs(30)) // Wait up to 30s for locks
            .pragma("synchronous", "NORMAL");

        // Every connection to ":memory:" is its own database; pin a single one
        let in_memory = config.url.contains(":memory:");
        let mut pool_options = SqlitePoolOptions::new()
            .max_connections(if in_memory { 1 } else { config.max_connections })
            .acquire_timeout(Duration::from_secs(30));
        if in_memory {
            pool_options = pool_options.idle_timeout(None).max_lifetime(None);
        }

        let pool = pool_options
            .connect_with(options)
            .await
            .context("Failed to connect to log database")?;

        Self::run_migrations(&pool).await?;

        Ok(Self { pool })
    }

    async fn run_migrations(pool: &SqlitePool) -> Result<()> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .context("Failed to run log database migrations")?;

        tracing::info!("Log database migrations completed");
        Ok(())
    }

    pub async fn get_request_log(&self, id: i64) -> Result<Option<RequestLog>> {
        let row = sqlx::query(
            "SELECT id, endpoint, client_ip, request_body, created_at
             FROM request_logs
             WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| request_from_row(&r)).transpose()
    }

    /// The response row correlated with a request, if one was written
    pub async fn get_response_for_request(&self, request_id: i64) -> Result<Option<ResponseLog>> {
        let row = sqlx::query(
            "SELECT id, request_id, status, model_used, response, prompt_tokens, completion_tokens,
                    total_tokens, response_time_ms, error_message, created_at
             FROM response_logs
             WHERE request_id = ?",
        )
        .bind(request_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| response_from_row(&r)).transpose()
    }

    /// Most recent request rows, newest first
    pub async fn recent_request_logs(&self, limit: u32) -> Result<Vec<RequestLog>> {
        let rows = sqlx::query(
            "SELECT id, endpoint, client_ip, request_body, created_at
             FROM request_logs
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(request_from_row).collect()
    }

    /// Most recent response rows, newest first
    pub async fn recent_response_logs(&self, limit: u32) -> Result<Vec<ResponseLog>> {
        let rows = sqlx::query(
            "SELECT id, request_id, status, model_used, response, prompt_tokens, completion_tokens,
                    total_tokens, response_time_ms, error_message, created_at
             FROM response_logs
             ORDER BY id DESC
             LIMIT ?",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(response_from_row).collect()
    }

    /// Delete a request row; its response row goes with it
    pub async fn delete_request_log(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM request_logs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .context("Failed to delete request log")?;

        Ok(result.rows_affected() > 0)
    }

    /// Delete requests created before `cutoff` together with their responses
    pub async fn delete_older_than(&self, cutoff: DateTime<Utc>) -> Result<CleanupStats> {
        let mut tx = self.pool.begin().await?;

        let responses = sqlx::query(
            "DELETE FROM response_logs
             WHERE request_id IN (SELECT id FROM request_logs WHERE created_at < ?1)
                OR (request_id IS NULL AND created_at < ?1)",
        )
        .bind(cutoff)
        .execute(&mut *tx)
        .await?;

        let requests = sqlx::query("DELETE FROM request_logs WHERE created_at < ?")
            .bind(cutoff)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        Ok(CleanupStats {
            requests_deleted: requests.rows_affected(),
            responses_deleted: responses.rows_affected(),
        })
    }

    pub async fn stats(&self) -> Result<LogStats> {
        let request_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM request_logs")
            .fetch_one(&self.pool)
            .await?;

        let response_count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM response_logs")
            .fetch_one(&self.pool)
            .await?;

        let failed_response_count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM response_logs WHERE status = 'failed'")
                .fetch_one(&self.pool)
                .await?;

        Ok(LogStats {
            request_count: request_count as u64,
            response_count: response_count as u64,
            failed_response_count: failed_response_count as u64,
        })
    }
}

#[async_trait]
impl LogStore for LogDb {
    async fn create_request_log(&self, log: NewRequestLog) -> Result<RequestLog> {
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO request_logs (endpoint, client_ip, request_body, created_at)
             VALUES (?, ?, ?, ?)",
        )
        .bind(&log.endpoint)
        .bind(&log.client_ip)
        .bind(&log.request_body)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert request log")?;

        Ok(RequestLog {
            id: result.last_insert_rowid(),
            endpoint: log.endpoint,
            client_ip: log.client_ip,
            request_body: log.request_body,
            created_at,
        })
    }

    async fn create_response_log(&self, log: NewResponseLog) -> Result<ResponseLog> {
        let created_at = Utc::now();

        let result = sqlx::query(
            "INSERT INTO response_logs (request_id, status, model_used, response, prompt_tokens,
                                        completion_tokens, total_tokens, response_time_ms,
                                        error_message, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(log.request_id)
        .bind(log.status.as_str())
        .bind(&log.model_used)
        .bind(&log.response)
        .bind(log.tokens.map(|t| t.prompt_tokens))
        .bind(log.tokens.map(|t| t.completion_tokens))
        .bind(log.tokens.map(|t| t.total_tokens))
        .bind(log.response_time_ms)
        .bind(&log.error_message)
        .bind(created_at)
        .execute(&self.pool)
        .await
        .context("Failed to insert response log")?;

        Ok(ResponseLog {
            id: result.last_insert_rowid(),
            request_id: Some(log.request_id),
            status: log.status,
            model_used: log.model_used,
            response: log.response,
            tokens: log.tokens,
            response_time_ms: log.response_time_ms,
            error_message: log.error_message,
            created_at,
        })
    }

    async fn ping(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .context("Log database is not reachable")?;
        Ok(())
    }
}

fn request_from_row(row: &SqliteRow) -> Result<RequestLog> {
    Ok(RequestLog {
        id: row.try_get("id")?,
        endpoint: row.try_get("endpoint")?,
        client_ip: row.try_get("client_ip")?,
        request_body: row.try_get("request_body")?,
        created_at: row.try_get("created_at")?,
    })
}

fn response_from_row(row: &SqliteRow) -> Result<ResponseLog> {
    let status: String = row.try_get("status")?;
    let status = ResponseStatus::parse(&status)
        .with_context(|| format!("Unknown response status: {}", status))?;

    let prompt_tokens: Option<i64> = row.try_get("prompt_tokens")?;
    let completion_tokens: Option<i64> = row.try_get("completion_tokens")?;
    let total_tokens: Option<i64> = row.try_get("total_tokens")?;
    let tokens = match (prompt_tokens, completion_tokens, total_tokens) {
        (Some(prompt_tokens), Some(completion_tokens), Some(total_tokens)) => Some(TokenCounts {
            prompt_tokens,
            completion_tokens,
            total_tokens,
        }),
        _ => None,
    };

    Ok(ResponseLog {
        id: row.try_get("id")?,
        request_id: row.try_get("request_id")?,
        status,
        model_used: row.try_get("model_used")?,
        response: row.try_get("response")?,
        tokens,
        response_time_ms: row.try_get("response_time_ms")?,
        error_message: row.try_get("error_message")?,
        created_at: row.try_get("created_at")?,
    })
}
