use std::collections::HashSet;
use std::str::FromStr;

use chrono::{Duration, Utc};
use db::models::batch_job::{
    BadgeType, BatchJob, BatchJobError, CreateBatchJob, JobPriority, JobSource,
};
use db::models::poster_status::{PosterStatus, PosterStatusError};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use thiserror::Error;

use crate::dispatcher::JobQueue;

pub const MAX_POSTERS_PER_JOB: usize = 1000;

/// Seconds of processing per poster, before badge work.
const BASE_SECONDS_PER_POSTER: i64 = 5;
/// Additional seconds per badge type per poster.
const SECONDS_PER_BADGE: i64 = 2;

#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("EmptyPosters: at least one poster is required")]
    EmptyPosters,
    #[error("TooManyPosters: {0} posters exceeds the limit of {MAX_POSTERS_PER_JOB}")]
    TooManyPosters(usize),
    #[error("EmptyBadgeTypes: at least one badge type is required")]
    EmptyBadgeTypes,
    #[error("UnknownBadgeType: {0}")]
    UnknownBadgeType(String),
    #[error("DuplicatePosterIds: {0}")]
    DuplicatePosterIds(String),
    #[error(transparent)]
    Job(#[from] BatchJobError),
    #[error(transparent)]
    PosterStatus(#[from] PosterStatusError),
}

impl SubmissionError {
    /// Validation failures are the caller's fault; repository failures are not.
    pub fn is_validation(&self) -> bool {
        !matches!(
            self,
            SubmissionError::Job(_) | SubmissionError::PosterStatus(_)
        )
    }
}

/// Dispatcher hint: a single manual poster gets the quick-turnaround lane,
/// everything else is a plain batch. The processing pipeline is identical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMethod {
    Immediate,
    Batch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct JobSubmission {
    pub user_id: String,
    pub name: String,
    pub poster_ids: Vec<String>,
    pub badge_types: Vec<String>,
    pub source: JobSource,
    #[serde(default)]
    pub user_tier: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CreatedJob {
    #[serde(flatten)]
    pub job: BatchJob,
    pub method: ExecutionMethod,
}

pub fn determine_method(poster_count: usize, source: JobSource) -> ExecutionMethod {
    if source == JobSource::Scheduled {
        return ExecutionMethod::Batch;
    }
    if poster_count == 1 {
        ExecutionMethod::Immediate
    } else {
        ExecutionMethod::Batch
    }
}

pub fn calculate_priority(source: JobSource, user_tier: Option<&str>) -> JobPriority {
    match source {
        JobSource::Scheduled => JobPriority::Scheduled,
        JobSource::Manual | JobSource::Api => match user_tier {
            Some("premium") => JobPriority::High,
            _ => JobPriority::Normal,
        },
    }
}

pub fn estimate_duration(poster_count: usize, badge_count: usize) -> Duration {
    let per_poster = BASE_SECONDS_PER_POSTER + SECONDS_PER_BADGE * badge_count as i64;
    Duration::seconds(poster_count as i64 * per_poster)
}

fn validate(submission: &JobSubmission) -> Result<Vec<BadgeType>, SubmissionError> {
    if submission.poster_ids.is_empty() {
        return Err(SubmissionError::EmptyPosters);
    }
    if submission.poster_ids.len() > MAX_POSTERS_PER_JOB {
        return Err(SubmissionError::TooManyPosters(submission.poster_ids.len()));
    }
    let mut seen = HashSet::new();
    for poster_id in &submission.poster_ids {
        if !seen.insert(poster_id.as_str()) {
            return Err(SubmissionError::DuplicatePosterIds(poster_id.clone()));
        }
    }

    if submission.badge_types.is_empty() {
        return Err(SubmissionError::EmptyBadgeTypes);
    }
    let mut badge_types = Vec::new();
    for raw in &submission.badge_types {
        let badge_type = BadgeType::from_str(raw)
            .map_err(|_| SubmissionError::UnknownBadgeType(raw.clone()))?;
        // ordered set: keep first occurrence
        if !badge_types.contains(&badge_type) {
            badge_types.push(badge_type);
        }
    }
    Ok(badge_types)
}

/// Validate a submission, persist the job with its pending poster rows, and
/// hand it to the dispatcher.
pub async fn create_batch_job(
    pool: &SqlitePool,
    queue: &JobQueue,
    submission: JobSubmission,
) -> Result<CreatedJob, SubmissionError> {
    let badge_types = validate(&submission)?;

    let method = determine_method(submission.poster_ids.len(), submission.source);
    let priority = calculate_priority(submission.source, submission.user_tier.as_deref());
    let duration = estimate_duration(submission.poster_ids.len(), badge_types.len());

    let job = BatchJob::create(
        pool,
        CreateBatchJob {
            user_id: submission.user_id,
            name: submission.name,
            source: submission.source,
            priority,
            badge_types,
            selected_poster_ids: submission.poster_ids,
            estimated_completion: Some(Utc::now() + duration),
        },
    )
    .await?;

    PosterStatus::seed_pending(pool, job.id, &job.selected_poster_ids.0).await?;

    tracing::info!(
        job_id = %job.id,
        posters = job.total_posters,
        priority = job.priority,
        ?method,
        "created batch job"
    );
    queue.enqueue(job.id);

    Ok(CreatedJob { job, method })
}
