use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type};
use strum_macros::Display;
use thiserror::Error;
use uuid::Uuid;

pub const MAX_RETRIES: i64 = 3;

#[derive(Debug, Error)]
pub enum PosterStatusError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Poster status not found: job {job_id} poster {poster_id}")]
    NotFound { job_id: Uuid, poster_id: String },
    #[error("Invalid poster transition: {0}")]
    InvalidTransition(String),
    #[error("Retry limit reached for poster {0}")]
    RetryLimit(String),
}

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Display)]
#[sqlx(type_name = "poster_state", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PosterState {
    Pending,
    Processing,
    Completed,
    Failed,
    Retrying,
}

impl PosterState {
    pub fn is_terminal(self) -> bool {
        matches!(self, PosterState::Completed | PosterState::Failed)
    }

    /// Forward-only lattice: pending → processing → {completed | failed |
    /// retrying}, retrying → processing.
    pub fn can_transition(self, to: PosterState) -> bool {
        matches!(
            (self, to),
            (PosterState::Pending, PosterState::Processing)
                | (PosterState::Processing, PosterState::Completed)
                | (PosterState::Processing, PosterState::Failed)
                | (PosterState::Processing, PosterState::Retrying)
                | (PosterState::Retrying, PosterState::Processing)
        )
    }
}

/// Per-poster sub-state of a batch job, unique on `(job_id, poster_id)`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PosterStatus {
    pub job_id: Uuid,
    pub poster_id: String,
    pub status: PosterState,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub output_path: Option<String>,
    pub error_message: Option<String>,
    pub retry_count: i64,
}

impl PosterStatus {
    /// Eagerly create pending rows for every poster in a new job.
    pub async fn seed_pending(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_ids: &[String],
    ) -> Result<(), PosterStatusError> {
        for poster_id in poster_ids {
            sqlx::query(
                r#"
                INSERT OR IGNORE INTO poster_processing_status (job_id, poster_id, status, retry_count)
                VALUES (?, ?, 'pending', 0)
                "#,
            )
            .bind(job_id)
            .bind(poster_id)
            .execute(pool)
            .await?;
        }
        Ok(())
    }

    pub async fn find(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
    ) -> Result<Option<Self>, PosterStatusError> {
        Ok(sqlx::query_as::<_, PosterStatus>(
            r#"SELECT * FROM poster_processing_status WHERE job_id = ? AND poster_id = ?"#,
        )
        .bind(job_id)
        .bind(poster_id)
        .fetch_optional(pool)
        .await?)
    }

    pub async fn get(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
    ) -> Result<Self, PosterStatusError> {
        Self::find(pool, job_id, poster_id)
            .await?
            .ok_or_else(|| PosterStatusError::NotFound {
                job_id,
                poster_id: poster_id.to_string(),
            })
    }

    pub async fn find_for_job(
        pool: &SqlitePool,
        job_id: Uuid,
    ) -> Result<Vec<Self>, PosterStatusError> {
        Ok(sqlx::query_as::<_, PosterStatus>(
            r#"SELECT * FROM poster_processing_status WHERE job_id = ? ORDER BY rowid"#,
        )
        .bind(job_id)
        .fetch_all(pool)
        .await?)
    }

    async fn transition(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
        to: PosterState,
    ) -> Result<Self, PosterStatusError> {
        let current = Self::get(pool, job_id, poster_id).await?;
        if !current.status.can_transition(to) {
            return Err(PosterStatusError::InvalidTransition(format!(
                "poster {poster_id}: {} -> {to}",
                current.status
            )));
        }
        Ok(current)
    }

    pub async fn mark_processing(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
    ) -> Result<(), PosterStatusError> {
        let current = Self::transition(pool, job_id, poster_id, PosterState::Processing).await?;
        sqlx::query(
            r#"
            UPDATE poster_processing_status
            SET status = 'processing', started_at = COALESCE(started_at, ?)
            WHERE job_id = ? AND poster_id = ? AND status = ?
            "#,
        )
        .bind(Utc::now())
        .bind(job_id)
        .bind(poster_id)
        .bind(current.status)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_completed(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
        output_path: &str,
    ) -> Result<(), PosterStatusError> {
        Self::transition(pool, job_id, poster_id, PosterState::Completed).await?;
        sqlx::query(
            r#"
            UPDATE poster_processing_status
            SET status = 'completed', completed_at = ?, output_path = ?, error_message = NULL
            WHERE job_id = ? AND poster_id = ? AND status = 'processing'
            "#,
        )
        .bind(Utc::now())
        .bind(output_path)
        .bind(job_id)
        .bind(poster_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn mark_failed(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
        error_message: &str,
    ) -> Result<(), PosterStatusError> {
        Self::transition(pool, job_id, poster_id, PosterState::Failed).await?;
        sqlx::query(
            r#"
            UPDATE poster_processing_status
            SET status = 'failed', completed_at = ?, error_message = ?
            WHERE job_id = ? AND poster_id = ? AND status = 'processing'
            "#,
        )
        .bind(Utc::now())
        .bind(error_message)
        .bind(job_id)
        .bind(poster_id)
        .execute(pool)
        .await?;
        Ok(())
    }

    /// Record a retryable failure: bump `retry_count` and park the row in
    /// `retrying` until the next attempt. Refuses to exceed [`MAX_RETRIES`].
    pub async fn mark_retrying(
        pool: &SqlitePool,
        job_id: Uuid,
        poster_id: &str,
        error_message: &str,
    ) -> Result<i64, PosterStatusError> {
        let current = Self::transition(pool, job_id, poster_id, PosterState::Retrying).await?;
        if current.retry_count >= MAX_RETRIES {
            return Err(PosterStatusError::RetryLimit(poster_id.to_string()));
        }
        sqlx::query(
            r#"
            UPDATE poster_processing_status
            SET status = 'retrying', retry_count = retry_count + 1, error_message = ?
            WHERE job_id = ? AND poster_id = ? AND status = 'processing' AND retry_count < ?
            "#,
        )
        .bind(error_message)
        .bind(job_id)
        .bind(poster_id)
        .bind(MAX_RETRIES)
        .execute(pool)
        .await?;
        Ok(current.retry_count + 1)
    }

    /// Counts used for progress snapshots: (completed, failed).
    pub async fn terminal_counts(
        pool: &SqlitePool,
        job_id: Uuid,
    ) -> Result<(i64, i64), PosterStatusError> {
        let row: (i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(CASE WHEN status = 'completed' THEN 1 END),
                COUNT(CASE WHEN status = 'failed' THEN 1 END)
            FROM poster_processing_status WHERE job_id = ?
            "#,
        )
        .bind(job_id)
        .fetch_one(pool)
        .await?;
        Ok(row)
    }
}
