//! Log Repository
//!
//! Handles all database operations related to job logs.

use chrono::{DateTime, Utc};
use mljob_core::domain::log::{LogEntry, LogLevel};
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Append a batch of messages to a job's log
///
/// The job row is locked for the duration of the insert so concurrent
/// batches for the same job get non-decreasing timestamps.
pub async fn add_entries(
    pool: &PgPool,
    job_id: Uuid,
    level: LogLevel,
    messages: &[String],
) -> StoreResult<Vec<LogEntry>> {
    let mut tx = pool.begin().await?;

    sqlx::query("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
        .bind(job_id)
        .execute(&mut *tx)
        .await?;

    let last: Option<DateTime<Utc>> =
        sqlx::query_scalar("SELECT MAX(ts) FROM job_logs WHERE job_id = $1")
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

    let now = Utc::now();
    let ts = last.map_or(now, |last| last.max(now));

    let mut entries = Vec::with_capacity(messages.len());
    for message in messages {
        let row = sqlx::query_as::<_, LogRow>(
            r#"
            INSERT INTO job_logs (job_id, ts, level, message)
            VALUES ($1, $2, $3, $4)
            RETURNING id, job_id, ts, level, message
            "#,
        )
        .bind(job_id)
        .bind(ts)
        .bind(level.as_str())
        .bind(message)
        .fetch_one(&mut *tx)
        .await?;

        entries.push(LogEntry::try_from(row)?);
    }

    tx.commit().await?;

    Ok(entries)
}

/// Get all log entries for a job
pub async fn find_by_job(pool: &PgPool, job_id: Uuid) -> StoreResult<Vec<LogEntry>> {
    let rows = sqlx::query_as::<_, LogRow>(
        r#"
        SELECT id, job_id, ts, level, message
        FROM job_logs
        WHERE job_id = $1
        ORDER BY ts ASC, id ASC
        "#,
    )
    .bind(job_id)
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(LogEntry::try_from).collect()
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct LogRow {
    id: i64,
    job_id: Uuid,
    ts: DateTime<Utc>,
    level: String,
    message: String,
}

impl TryFrom<LogRow> for LogEntry {
    type Error = StoreError;

    fn try_from(row: LogRow) -> Result<Self, Self::Error> {
        Ok(LogEntry {
            id: row.id,
            job_id: row.job_id,
            ts: row.ts,
            level: row.level.parse().map_err(StoreError::Corrupt)?,
            message: row.message,
        })
    }
}
