//! Job Repository
//!
//! Handles all database operations related to jobs.

use chrono::{DateTime, Utc};
use mljob_core::domain::job::{Job, JobStatus};
use sqlx::PgPool;
use uuid::Uuid;

use super::{StoreError, StoreResult};

const JOB_COLUMNS: &str = "id, name, status, bundle_reference, main_entry, requirements_file, \
                           accepted_by, image_tag, created_at, updated_at";

/// Insert a new job
pub async fn create(pool: &PgPool, job: &Job) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO jobs (id, name, status, bundle_reference, main_entry,
                          requirements_file, accepted_by, image_tag, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
        "#,
    )
    .bind(job.id)
    .bind(&job.name)
    .bind(job.status.as_str())
    .bind(&job.bundle_reference)
    .bind(&job.main_entry)
    .bind(&job.requirements_file)
    .bind(job.accepted_by)
    .bind(&job.image_tag)
    .bind(job.created_at)
    .bind(job.updated_at)
    .execute(pool)
    .await?;

    Ok(())
}

/// Find a job by ID
pub async fn find_by_id(pool: &PgPool, id: Uuid) -> StoreResult<Option<Job>> {
    let row = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM jobs WHERE id = $1",
        JOB_COLUMNS
    ))
    .bind(id)
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

/// Find jobs by status, oldest first
pub async fn find_by_status(pool: &PgPool, status: JobStatus) -> StoreResult<Vec<Job>> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM jobs WHERE status = $1 ORDER BY created_at ASC",
        JOB_COLUMNS
    ))
    .bind(status.as_str())
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// List all jobs, newest first
pub async fn list_all(pool: &PgPool) -> StoreResult<Vec<Job>> {
    let rows = sqlx::query_as::<_, JobRow>(&format!(
        "SELECT {} FROM jobs ORDER BY created_at DESC",
        JOB_COLUMNS
    ))
    .fetch_all(pool)
    .await?;

    rows.into_iter().map(Job::try_from).collect()
}

/// Conditional status update
///
/// The guard and the write are one statement, so two concurrent callers
/// cannot both see the old status.
pub async fn transition(
    pool: &PgPool,
    id: Uuid,
    from: &[JobStatus],
    to: JobStatus,
    accepted_by: Option<Uuid>,
) -> StoreResult<Option<Job>> {
    let from: Vec<String> = from.iter().map(|s| s.as_str().to_string()).collect();

    let row = sqlx::query_as::<_, JobRow>(&format!(
        r#"
        UPDATE jobs
        SET status = $1, updated_at = $2, accepted_by = COALESCE(accepted_by, $3)
        WHERE id = $4 AND status = ANY($5)
        RETURNING {}
        "#,
        JOB_COLUMNS
    ))
    .bind(to.as_str())
    .bind(Utc::now())
    .bind(accepted_by)
    .bind(id)
    .bind(&from)
    .fetch_optional(pool)
    .await?;

    row.map(Job::try_from).transpose()
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct JobRow {
    id: Uuid,
    name: String,
    status: String,
    bundle_reference: String,
    main_entry: String,
    requirements_file: String,
    accepted_by: Option<Uuid>,
    image_tag: String,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<JobRow> for Job {
    type Error = StoreError;

    fn try_from(row: JobRow) -> Result<Self, Self::Error> {
        let status = row.status.parse::<JobStatus>().map_err(StoreError::Corrupt)?;

        Ok(Job {
            id: row.id,
            name: row.name,
            status,
            bundle_reference: row.bundle_reference,
            main_entry: row.main_entry,
            requirements_file: row.requirements_file,
            accepted_by: row.accepted_by,
            image_tag: row.image_tag,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
