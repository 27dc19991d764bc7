use chrono::{DateTime, Utc};
use db::models::batch_job::{BatchJob, BatchJobError, JobStatus};
use db::models::poster_status::PosterState;
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::services::hub::ProgressHub;

/// Sub-poster pipeline checkpoints surfaced to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PosterStage {
    Started,
    Composed,
    Uploaded,
}

/// Job-level aggregate shipped with every event and on subscribe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobProgress {
    pub job_id: Uuid,
    pub status: JobStatus,
    pub total: i64,
    pub completed: i64,
    pub failed: i64,
    pub percent: f64,
    pub eta: Option<DateTime<Utc>>,
}

impl JobProgress {
    fn from_job(job: &BatchJob) -> Self {
        let processed = job.completed_posters + job.failed_posters;
        let percent = if job.total_posters > 0 {
            processed as f64 / job.total_posters as f64 * 100.0
        } else {
            0.0
        };
        Self {
            job_id: job.id,
            status: job.status,
            total: job.total_posters,
            completed: job.completed_posters,
            failed: job.failed_posters,
            percent,
            eta: estimate_eta(job, processed),
        }
    }
}

/// Prefer observed throughput once posters have finished; fall back to the
/// submission-time estimate.
fn estimate_eta(job: &BatchJob, processed: i64) -> Option<DateTime<Utc>> {
    if job.status.is_terminal() {
        return None;
    }
    let remaining = job.total_posters - processed;
    if remaining <= 0 {
        return None;
    }
    match job.started_at {
        Some(started) if processed > 0 => {
            let elapsed = Utc::now() - started;
            let per_poster = elapsed / processed as i32;
            Some(Utc::now() + per_poster * remaining as i32)
        }
        _ => job.estimated_completion,
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Current aggregate, sent to a subscriber on connect.
    Snapshot {
        job_id: Uuid,
        progress: JobProgress,
        timestamp: DateTime<Utc>,
    },
    /// Exactly one per poster status transition.
    PosterUpdate {
        job_id: Uuid,
        poster_id: String,
        status: PosterState,
        progress: JobProgress,
        timestamp: DateTime<Utc>,
    },
    /// Sub-poster checkpoint from the processor pipeline.
    PosterStage {
        job_id: Uuid,
        poster_id: String,
        stage: PosterStage,
        timestamp: DateTime<Utc>,
    },
    /// Terminal event; the hub closes the per-job channel after this.
    JobFinished {
        job_id: Uuid,
        status: JobStatus,
        progress: JobProgress,
        timestamp: DateTime<Utc>,
    },
}

impl ProgressEvent {
    pub fn job_id(&self) -> Uuid {
        match self {
            ProgressEvent::Snapshot { job_id, .. }
            | ProgressEvent::PosterUpdate { job_id, .. }
            | ProgressEvent::PosterStage { job_id, .. }
            | ProgressEvent::JobFinished { job_id, .. } => *job_id,
        }
    }

    pub fn is_final(&self) -> bool {
        matches!(self, ProgressEvent::JobFinished { .. })
    }
}

/// Aggregates poster transitions into job progress and pushes events into
/// the hub.
#[derive(Clone)]
pub struct ProgressTracker {
    pool: SqlitePool,
    hub: ProgressHub,
}

impl ProgressTracker {
    pub fn new(pool: SqlitePool, hub: ProgressHub) -> Self {
        Self { pool, hub }
    }

    pub fn hub(&self) -> &ProgressHub {
        &self.hub
    }

    pub async fn progress(&self, job_id: Uuid) -> Result<JobProgress, BatchJobError> {
        let job = BatchJob::find_by_id(&self.pool, job_id).await?;
        Ok(JobProgress::from_job(&job))
    }

    pub async fn snapshot(&self, job_id: Uuid) -> Result<ProgressEvent, BatchJobError> {
        Ok(ProgressEvent::Snapshot {
            job_id,
            progress: self.progress(job_id).await?,
            timestamp: Utc::now(),
        })
    }

    /// Emit the single event for a poster status transition.
    pub async fn poster_update(
        &self,
        job_id: Uuid,
        poster_id: &str,
        status: PosterState,
    ) -> Result<ProgressEvent, BatchJobError> {
        let event = ProgressEvent::PosterUpdate {
            job_id,
            poster_id: poster_id.to_string(),
            status,
            progress: self.progress(job_id).await?,
            timestamp: Utc::now(),
        };
        self.hub.publish(&event);
        Ok(event)
    }

    /// Emit a sub-poster checkpoint. Never fails the caller: stage events are
    /// advisory.
    pub fn poster_stage(&self, job_id: Uuid, poster_id: &str, stage: PosterStage) {
        let event = ProgressEvent::PosterStage {
            job_id,
            poster_id: poster_id.to_string(),
            stage,
            timestamp: Utc::now(),
        };
        self.hub.publish(&event);
    }

    /// Emit the terminal event and close the job's channel.
    pub async fn job_finished(&self, job_id: Uuid) -> Result<ProgressEvent, BatchJobError> {
        let progress = self.progress(job_id).await?;
        let event = ProgressEvent::JobFinished {
            job_id,
            status: progress.status,
            progress,
            timestamp: Utc::now(),
        };
        self.hub.publish(&event);
        self.hub.finish(job_id);
        Ok(event)
    }
}
