//! Worker Repository
//!
//! Handles all database operations related to workers.

use chrono::{DateTime, Utc};
use mljob_core::domain::worker::Worker;
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, StoreResult};

/// Insert a worker or refresh its `last_seen`
pub async fn upsert(pool: &PgPool, name: &str) -> StoreResult<Worker> {
    let candidate = Worker::new(name);

    let row = sqlx::query_as::<_, WorkerRow>(
        r#"
        INSERT INTO workers (id, name, status, last_seen, registered_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO UPDATE SET last_seen = EXCLUDED.last_seen
        RETURNING id, name, status, last_seen, registered_at
        "#,
    )
    .bind(candidate.id)
    .bind(&candidate.name)
    .bind(candidate.status.as_str())
    .bind(candidate.last_seen)
    .bind(candidate.registered_at)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// Find a worker by name, inserting it if unknown
pub async fn find_or_create(pool: &PgPool, name: &str) -> StoreResult<Worker> {
    let candidate = Worker::new(name);

    sqlx::query(
        r#"
        INSERT INTO workers (id, name, status, last_seen, registered_at)
        VALUES ($1, $2, $3, $4, $5)
        ON CONFLICT (name) DO NOTHING
        "#,
    )
    .bind(candidate.id)
    .bind(&candidate.name)
    .bind(candidate.status.as_str())
    .bind(candidate.last_seen)
    .bind(candidate.registered_at)
    .execute(pool)
    .await?;

    let row = sqlx::query_as::<_, WorkerRow>(
        "SELECT id, name, status, last_seen, registered_at FROM workers WHERE name = $1",
    )
    .bind(name)
    .fetch_one(pool)
    .await?;

    row.try_into()
}

/// List all workers
pub async fn list_all(pool: &PgPool) -> StoreResult<Vec<Worker>> {
    let rows = sqlx::query_as::<_, WorkerRow>(
        r#"
        SELECT id, name, status, last_seen, registered_at
        FROM workers
        ORDER BY registered_at ASC
        "#,
    )
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Worker::try_from).collect()
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct WorkerRow {
    id: Uuid,
    name: String,
    status: String,
    last_seen: DateTime<Utc>,
    registered_at: DateTime<Utc>,
}

impl TryFrom<WorkerRow> for Worker {
    type Error = StoreError;

    fn try_from(row: WorkerRow) -> Result<Self, Self::Error> {
        Ok(Worker {
            id: row.id,
            name: row.name,
            status: row.status.parse().map_err(StoreError::Corrupt)?,
            last_seen: row.last_seen,
            registered_at: row.registered_at,
        })
    }
}
