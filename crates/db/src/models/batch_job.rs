use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, SqlitePool, Type, types::Json};
use strum_macros::{Display, EnumString};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum BatchJobError {
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Batch job not found: {0}")]
    NotFound(Uuid),
    #[error("Invalid job transition: {0}")]
    InvalidTransition(String),
}

/// Where a job submission came from.
#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Display, EnumString)]
#[sqlx(type_name = "job_source", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobSource {
    Manual,
    Scheduled,
    Api,
}

#[derive(Debug, Clone, Copy, Type, Serialize, Deserialize, PartialEq, Eq, Display)]
#[sqlx(type_name = "job_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum JobStatus {
    Queued,
    Processing,
    Paused,
    Cancelled,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }
}

/// Overlay badge kinds a job can request.
#[derive(
    Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Display, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum BadgeType {
    Audio,
    Resolution,
    Review,
    Awards,
}

/// Scheduling weight, lower runs first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPriority {
    High,
    Normal,
    Scheduled,
}

impl JobPriority {
    pub fn as_i64(self) -> i64 {
        match self {
            JobPriority::High => 3,
            JobPriority::Normal => 5,
            JobPriority::Scheduled => 7,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct BatchJob {
    pub id: Uuid,
    pub user_id: String,
    pub name: String,
    pub source: JobSource,
    pub status: JobStatus,
    pub priority: i64,
    pub badge_types: Json<Vec<BadgeType>>,
    pub selected_poster_ids: Json<Vec<String>>,
    pub total_posters: i64,
    pub completed_posters: i64,
    pub failed_posters: i64,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub estimated_completion: Option<DateTime<Utc>>,
    pub error_summary: Option<String>,
}

/// Aggregate queue counters surfaced by the jobs API.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobStats {
    pub queued: i64,
    pub processing: i64,
    pub paused: i64,
    pub cancelled: i64,
    pub completed: i64,
    pub failed: i64,
    pub pending_posters: i64,
}

#[derive(Debug, Clone)]
pub struct CreateBatchJob {
    pub user_id: String,
    pub name: String,
    pub source: JobSource,
    pub priority: JobPriority,
    pub badge_types: Vec<BadgeType>,
    pub selected_poster_ids: Vec<String>,
    pub estimated_completion: Option<DateTime<Utc>>,
}

impl BatchJob {
    pub async fn create(
        pool: &SqlitePool,
        create: CreateBatchJob,
    ) -> Result<Self, BatchJobError> {
        let now = Utc::now();
        let job = BatchJob {
            id: Uuid::new_v4(),
            user_id: create.user_id,
            name: create.name,
            source: create.source,
            status: JobStatus::Queued,
            priority: create.priority.as_i64(),
            total_posters: create.selected_poster_ids.len() as i64,
            badge_types: Json(create.badge_types),
            selected_poster_ids: Json(create.selected_poster_ids),
            completed_posters: 0,
            failed_posters: 0,
            created_at: now,
            started_at: None,
            completed_at: None,
            estimated_completion: create.estimated_completion,
            error_summary: None,
        };

        sqlx::query(
            r#"
            INSERT INTO batch_jobs (
                id, user_id, name, source, status, priority,
                badge_types, selected_poster_ids,
                total_posters, completed_posters, failed_posters,
                created_at, started_at, completed_at, estimated_completion, error_summary
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(job.id)
        .bind(&job.user_id)
        .bind(&job.name)
        .bind(job.source)
        .bind(job.status)
        .bind(job.priority)
        .bind(&job.badge_types)
        .bind(&job.selected_poster_ids)
        .bind(job.total_posters)
        .bind(job.completed_posters)
        .bind(job.failed_posters)
        .bind(job.created_at)
        .bind(job.started_at)
        .bind(job.completed_at)
        .bind(job.estimated_completion)
        .bind(&job.error_summary)
        .execute(pool)
        .await?;

        Ok(job)
    }

    pub async fn find_by_id(pool: &SqlitePool, id: Uuid) -> Result<Self, BatchJobError> {
        sqlx::query_as::<_, BatchJob>(r#"SELECT * FROM batch_jobs WHERE id = ?"#)
            .bind(id)
            .fetch_optional(pool)
            .await?
            .ok_or(BatchJobError::NotFound(id))
    }

    pub async fn list_recent(pool: &SqlitePool, limit: i64) -> Result<Vec<Self>, BatchJobError> {
        Ok(sqlx::query_as::<_, BatchJob>(
            r#"SELECT * FROM batch_jobs ORDER BY created_at DESC LIMIT ?"#,
        )
        .bind(limit)
        .fetch_all(pool)
        .await?)
    }

    /// Queued jobs in dispatch order: priority ascending, then FIFO.
    pub async fn list_queued(pool: &SqlitePool) -> Result<Vec<Self>, BatchJobError> {
        Ok(sqlx::query_as::<_, BatchJob>(
            r#"
            SELECT * FROM batch_jobs
            WHERE status = 'queued'
            ORDER BY priority ASC, created_at ASC
            "#,
        )
        .fetch_all(pool)
        .await?)
    }

    pub async fn current_status(pool: &SqlitePool, id: Uuid) -> Result<JobStatus, BatchJobError> {
        let row: Option<(JobStatus,)> =
            sqlx::query_as(r#"SELECT status FROM batch_jobs WHERE id = ?"#)
                .bind(id)
                .fetch_optional(pool)
                .await?;
        row.map(|(status,)| status).ok_or(BatchJobError::NotFound(id))
    }

    /// Claim a queued job for execution. Returns false if the job is no
    /// longer queued (cancelled while waiting, or another worker won).
    pub async fn mark_started(pool: &SqlitePool, id: Uuid) -> Result<bool, BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = 'processing', started_at = ?
            WHERE id = ? AND status = 'queued'
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Generic status update. Terminal rows never transition again.
    pub async fn update_status(
        pool: &SqlitePool,
        id: Uuid,
        status: JobStatus,
    ) -> Result<(), BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs SET status = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(status)
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            let current = Self::current_status(pool, id).await?;
            return Err(BatchJobError::InvalidTransition(format!(
                "job {id} is {current}, cannot move to {status}"
            )));
        }
        Ok(())
    }

    /// Single-statement counter bump, guarded so counters can never exceed
    /// `total_posters`.
    pub async fn record_poster_completed(
        pool: &SqlitePool,
        id: Uuid,
    ) -> Result<(), BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs SET completed_posters = completed_posters + 1
            WHERE id = ? AND completed_posters + failed_posters < total_posters
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BatchJobError::InvalidTransition(format!(
                "job {id}: poster counters already at total"
            )));
        }
        Ok(())
    }

    pub async fn record_poster_failed(pool: &SqlitePool, id: Uuid) -> Result<(), BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs SET failed_posters = failed_posters + 1
            WHERE id = ? AND completed_posters + failed_posters < total_posters
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(BatchJobError::InvalidTransition(format!(
                "job {id}: poster counters already at total"
            )));
        }
        Ok(())
    }

    /// Move a job into a terminal state and stamp `completed_at`.
    pub async fn finalize(
        pool: &SqlitePool,
        id: Uuid,
        status: JobStatus,
        error_summary: Option<String>,
    ) -> Result<(), BatchJobError> {
        if !status.is_terminal() {
            return Err(BatchJobError::InvalidTransition(format!(
                "{status} is not a terminal status"
            )));
        }
        // Re-finalising to the same terminal status is idempotent (a worker
        // observing an administrative cancel re-stamps completed_at); any
        // other write against a terminal row is ignored.
        sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = ?, completed_at = ?, error_summary = COALESCE(?, error_summary)
            WHERE id = ? AND (status NOT IN ('completed', 'failed', 'cancelled') OR status = ?)
            "#,
        )
        .bind(status)
        .bind(Utc::now())
        .bind(error_summary)
        .bind(id)
        .bind(status)
        .execute(pool)
        .await?;
        Ok(())
    }

    pub async fn set_error_summary(
        pool: &SqlitePool,
        id: Uuid,
        summary: &str,
    ) -> Result<(), BatchJobError> {
        sqlx::query(r#"UPDATE batch_jobs SET error_summary = ? WHERE id = ?"#)
            .bind(summary)
            .bind(id)
            .execute(pool)
            .await?;
        Ok(())
    }

    /// Administrative cancel. Idempotent: cancelling a terminal job is a
    /// no-op and reports `false`.
    pub async fn request_cancel(pool: &SqlitePool, id: Uuid) -> Result<bool, BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs
            SET status = 'cancelled', completed_at = ?
            WHERE id = ? AND status NOT IN ('completed', 'failed', 'cancelled')
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Administrative pause. Only queued or processing jobs can pause.
    pub async fn request_pause(pool: &SqlitePool, id: Uuid) -> Result<bool, BatchJobError> {
        let result = sqlx::query(
            r#"
            UPDATE batch_jobs SET status = 'paused'
            WHERE id = ? AND status IN ('queued', 'processing')
            "#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Return a paused job to the queue. Resume on a non-paused job is a
    /// no-op and reports `false`.
    pub async fn resume(pool: &SqlitePool, id: Uuid) -> Result<bool, BatchJobError> {
        let result = sqlx::query(
            r#"UPDATE batch_jobs SET status = 'queued' WHERE id = ? AND status = 'paused'"#,
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }

    /// Queue overview: job counts grouped by status, plus poster totals
    /// across non-terminal jobs.
    pub async fn stats(pool: &SqlitePool) -> Result<JobStats, BatchJobError> {
        let rows: Vec<(JobStatus, i64)> = sqlx::query_as(
            r#"SELECT status, COUNT(*) FROM batch_jobs GROUP BY status"#,
        )
        .fetch_all(pool)
        .await?;

        let mut stats = JobStats::default();
        for (status, count) in rows {
            match status {
                JobStatus::Queued => stats.queued = count,
                JobStatus::Processing => stats.processing = count,
                JobStatus::Paused => stats.paused = count,
                JobStatus::Cancelled => stats.cancelled = count,
                JobStatus::Completed => stats.completed = count,
                JobStatus::Failed => stats.failed = count,
            }
        }

        let (pending_posters,): (i64,) = sqlx::query_as(
            r#"
            SELECT COALESCE(SUM(total_posters - completed_posters - failed_posters), 0)
            FROM batch_jobs
            WHERE status IN ('queued', 'processing', 'paused')
            "#,
        )
        .fetch_one(pool)
        .await?;
        stats.pending_posters = pending_posters;

        Ok(stats)
    }

    /// Startup recovery: jobs left `processing` by an interrupted process go
    /// back to the queue. Returns the ids that were requeued.
    pub async fn requeue_interrupted(pool: &SqlitePool) -> Result<Vec<Uuid>, BatchJobError> {
        let ids: Vec<(Uuid,)> =
            sqlx::query_as(r#"SELECT id FROM batch_jobs WHERE status = 'processing'"#)
                .fetch_all(pool)
                .await?;
        sqlx::query(r#"UPDATE batch_jobs SET status = 'queued' WHERE status = 'processing'"#)
            .execute(pool)
            .await?;
        Ok(ids.into_iter().map(|(id,)| id).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::test_utils::{create_test_job, setup_test_pool};

    #[tokio::test]
    async fn create_and_find_roundtrip() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1", "p2"], JobPriority::Normal).await;

        let found = BatchJob::find_by_id(&pool, job.id).await.unwrap();
        assert_eq!(found.status, JobStatus::Queued);
        assert_eq!(found.total_posters, 2);
        assert_eq!(found.selected_poster_ids.0, vec!["p1", "p2"]);
        assert_eq!(found.badge_types.0, vec![BadgeType::Audio]);
    }

    #[tokio::test]
    async fn queued_jobs_order_by_priority_then_fifo() {
        let pool = setup_test_pool().await;
        let low = create_test_job(&pool, &["a"], JobPriority::Scheduled).await;
        let high = create_test_job(&pool, &["b"], JobPriority::High).await;
        let normal = create_test_job(&pool, &["c"], JobPriority::Normal).await;

        let queued = BatchJob::list_queued(&pool).await.unwrap();
        let ids: Vec<Uuid> = queued.iter().map(|j| j.id).collect();
        assert_eq!(ids, vec![high.id, normal.id, low.id]);
    }

    #[tokio::test]
    async fn terminal_jobs_never_transition() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1"], JobPriority::Normal).await;

        BatchJob::finalize(&pool, job.id, JobStatus::Completed, None)
            .await
            .unwrap();
        let err = BatchJob::update_status(&pool, job.id, JobStatus::Processing)
            .await
            .unwrap_err();
        assert!(matches!(err, BatchJobError::InvalidTransition(_)));
        assert!(!BatchJob::request_cancel(&pool, job.id).await.unwrap());
    }

    #[tokio::test]
    async fn counters_cannot_exceed_total() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1"], JobPriority::Normal).await;

        BatchJob::record_poster_completed(&pool, job.id).await.unwrap();
        let err = BatchJob::record_poster_failed(&pool, job.id).await.unwrap_err();
        assert!(matches!(err, BatchJobError::InvalidTransition(_)));

        let job = BatchJob::find_by_id(&pool, job.id).await.unwrap();
        assert_eq!(job.completed_posters + job.failed_posters, job.total_posters);
    }

    #[tokio::test]
    async fn cancel_is_idempotent() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1"], JobPriority::Normal).await;

        assert!(BatchJob::request_cancel(&pool, job.id).await.unwrap());
        assert!(!BatchJob::request_cancel(&pool, job.id).await.unwrap());
        let job = BatchJob::find_by_id(&pool, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
        assert!(job.completed_at.is_some());
    }

    #[tokio::test]
    async fn resume_only_applies_to_paused_jobs() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1"], JobPriority::Normal).await;

        assert!(!BatchJob::resume(&pool, job.id).await.unwrap());
        assert!(BatchJob::request_pause(&pool, job.id).await.unwrap());
        assert!(BatchJob::resume(&pool, job.id).await.unwrap());
        let job = BatchJob::find_by_id(&pool, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }

    #[tokio::test]
    async fn stats_group_jobs_by_status() {
        let pool = setup_test_pool().await;
        let running = create_test_job(&pool, &["p1", "p2", "p3"], JobPriority::Normal).await;
        let queued = create_test_job(&pool, &["q1"], JobPriority::Normal).await;
        let done = create_test_job(&pool, &["d1"], JobPriority::Normal).await;

        BatchJob::mark_started(&pool, running.id).await.unwrap();
        BatchJob::record_poster_completed(&pool, running.id).await.unwrap();
        BatchJob::finalize(&pool, done.id, JobStatus::Completed, None)
            .await
            .unwrap();
        let _ = queued;

        let stats = BatchJob::stats(&pool).await.unwrap();
        assert_eq!(stats.queued, 1);
        assert_eq!(stats.processing, 1);
        assert_eq!(stats.completed, 1);
        // 2 left on the running job + 1 on the queued job
        assert_eq!(stats.pending_posters, 3);
    }

    #[tokio::test]
    async fn interrupted_jobs_requeue_on_boot() {
        let pool = setup_test_pool().await;
        let job = create_test_job(&pool, &["p1"], JobPriority::Normal).await;
        assert!(BatchJob::mark_started(&pool, job.id).await.unwrap());

        let requeued = BatchJob::requeue_interrupted(&pool).await.unwrap();
        assert_eq!(requeued, vec![job.id]);
        let job = BatchJob::find_by_id(&pool, job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Queued);
    }
}
