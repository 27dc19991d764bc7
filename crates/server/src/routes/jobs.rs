use axum::{
    Json, Router,
    extract::{Path, State},
    routing::{get, post},
};
use db::models::batch_job::{BatchJob, JobStats};
use db::models::poster_status::PosterStatus;
use serde::Serialize;
use services::services::progress::JobProgress;
use utils::response::ApiResponse;
use uuid::Uuid;
use workers::job_creator::{CreatedJob, JobSubmission, create_batch_job};

use crate::{AppState, error::ApiError};

pub async fn submit_job(
    State(state): State<AppState>,
    Json(submission): Json<JobSubmission>,
) -> Result<Json<ApiResponse<CreatedJob>>, ApiError> {
    let created = create_batch_job(&state.db.pool, &state.queue, submission).await?;
    Ok(Json(ApiResponse::success(created)))
}

pub async fn list_jobs(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<Vec<BatchJob>>>, ApiError> {
    let jobs = BatchJob::list_recent(&state.db.pool, 100).await?;
    Ok(Json(ApiResponse::success(jobs)))
}

pub async fn job_stats(
    State(state): State<AppState>,
) -> Result<Json<ApiResponse<JobStats>>, ApiError> {
    let stats = BatchJob::stats(&state.db.pool).await?;
    Ok(Json(ApiResponse::success(stats)))
}

pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<BatchJob>>, ApiError> {
    let job = BatchJob::find_by_id(&state.db.pool, job_id).await?;
    Ok(Json(ApiResponse::success(job)))
}

pub async fn list_job_posters(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<PosterStatus>>>, ApiError> {
    // 404 for unknown jobs rather than an empty list
    BatchJob::find_by_id(&state.db.pool, job_id).await?;
    let posters = PosterStatus::find_for_job(&state.db.pool, job_id).await?;
    Ok(Json(ApiResponse::success(posters)))
}

pub async fn job_progress(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<JobProgress>>, ApiError> {
    let progress = state.tracker.progress(job_id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

/// Control responses report whether the call changed anything; repeated
/// calls are no-ops, not errors.
#[derive(Debug, Serialize)]
pub struct ControlOutcome {
    pub job_id: Uuid,
    pub changed: bool,
}

pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ControlOutcome>>, ApiError> {
    BatchJob::find_by_id(&state.db.pool, job_id).await?;
    let changed = BatchJob::request_cancel(&state.db.pool, job_id).await?;
    if changed {
        tracing::info!(job_id = %job_id, "cancel requested");
    }
    Ok(Json(ApiResponse::success(ControlOutcome { job_id, changed })))
}

pub async fn pause_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ControlOutcome>>, ApiError> {
    BatchJob::find_by_id(&state.db.pool, job_id).await?;
    let changed = BatchJob::request_pause(&state.db.pool, job_id).await?;
    if changed {
        tracing::info!(job_id = %job_id, "pause requested");
    }
    Ok(Json(ApiResponse::success(ControlOutcome { job_id, changed })))
}

pub async fn resume_job(
    State(state): State<AppState>,
    Path(job_id): Path<Uuid>,
) -> Result<Json<ApiResponse<ControlOutcome>>, ApiError> {
    BatchJob::find_by_id(&state.db.pool, job_id).await?;
    let changed = BatchJob::resume(&state.db.pool, job_id).await?;
    if changed {
        tracing::info!(job_id = %job_id, "resume requested, re-queueing");
        state.queue.enqueue(job_id);
    }
    Ok(Json(ApiResponse::success(ControlOutcome { job_id, changed })))
}

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/api/jobs", post(submit_job).get(list_jobs))
        .route("/api/jobs/stats", get(job_stats))
        .route("/api/jobs/{job_id}", get(get_job))
        .route("/api/jobs/{job_id}/posters", get(list_job_posters))
        .route("/api/jobs/{job_id}/progress", get(job_progress))
        .route("/api/jobs/{job_id}/cancel", post(cancel_job))
        .route("/api/jobs/{job_id}/pause", post(pause_job))
        .route("/api/jobs/{job_id}/resume", post(resume_job))
}

#[cfg(test)]
mod tests {
    use super::*;
    use db::DBService;
    use db::models::batch_job::{JobSource, JobStatus};
    use services::services::hub::ProgressHub;
    use services::services::progress::ProgressTracker;
    use std::sync::Arc;
    use workers::dispatcher::job_queue;

    async fn test_state() -> AppState {
        let db = DBService::new_in_memory().await.unwrap();
        let tracker = ProgressTracker::new(db.pool.clone(), ProgressHub::new());
        let (queue, _rx) = job_queue();
        AppState {
            db,
            settings: Arc::new(services::services::config::AppSettings::default()),
            tracker,
            queue,
        }
    }

    fn submission() -> JobSubmission {
        JobSubmission {
            user_id: "u1".into(),
            name: "demo".into(),
            poster_ids: vec!["P1".into(), "P2".into()],
            badge_types: vec!["audio".into()],
            source: JobSource::Manual,
            user_tier: None,
        }
    }

    #[tokio::test]
    async fn submit_then_fetch_roundtrip() {
        let state = test_state().await;
        let response = submit_job(State(state.clone()), Json(submission()))
            .await
            .unwrap();
        let created = response.0.data.unwrap();
        assert_eq!(created.job.status, JobStatus::Queued);

        let fetched = get_job(State(state.clone()), Path(created.job.id)).await.unwrap();
        assert_eq!(fetched.0.data.unwrap().id, created.job.id);

        let posters = list_job_posters(State(state), Path(created.job.id)).await.unwrap();
        assert_eq!(posters.0.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_submission_produces_distinct_jobs() {
        let state = test_state().await;
        let first = submit_job(State(state.clone()), Json(submission())).await.unwrap();
        let second = submit_job(State(state.clone()), Json(submission())).await.unwrap();
        assert_ne!(
            first.0.data.unwrap().job.id,
            second.0.data.unwrap().job.id
        );
        let jobs = list_jobs(State(state)).await.unwrap();
        assert_eq!(jobs.0.data.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn invalid_submission_maps_to_validation_error() {
        let state = test_state().await;
        let mut bad = submission();
        bad.poster_ids.clear();
        let err = submit_job(State(state), Json(bad)).await.unwrap_err();
        match err {
            ApiError::Submission(inner) => assert!(inner.is_validation()),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[tokio::test]
    async fn control_endpoints_are_idempotent() {
        let state = test_state().await;
        let created = submit_job(State(state.clone()), Json(submission()))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        let id = created.job.id;

        let first = cancel_job(State(state.clone()), Path(id)).await.unwrap();
        assert!(first.0.data.unwrap().changed);
        let second = cancel_job(State(state.clone()), Path(id)).await.unwrap();
        assert!(!second.0.data.unwrap().changed);

        // resume on a cancelled (non-paused) job is a no-op
        let resumed = resume_job(State(state), Path(id)).await.unwrap();
        assert!(!resumed.0.data.unwrap().changed);
    }

    #[tokio::test]
    async fn stats_reflect_submissions() {
        let state = test_state().await;
        submit_job(State(state.clone()), Json(submission())).await.unwrap();
        submit_job(State(state.clone()), Json(submission())).await.unwrap();

        let stats = job_stats(State(state)).await.unwrap().0.data.unwrap();
        assert_eq!(stats.queued, 2);
        assert_eq!(stats.pending_posters, 4);
    }

    #[tokio::test]
    async fn unknown_job_is_a_404() {
        let state = test_state().await;
        let err = get_job(State(state), Path(Uuid::new_v4())).await.unwrap_err();
        assert!(matches!(
            err,
            ApiError::Job(db::models::batch_job::BatchJobError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn progress_snapshot_for_fresh_job() {
        let state = test_state().await;
        let created = submit_job(State(state.clone()), Json(submission()))
            .await
            .unwrap()
            .0
            .data
            .unwrap();

        let progress = job_progress(State(state), Path(created.job.id))
            .await
            .unwrap()
            .0
            .data
            .unwrap();
        assert_eq!(progress.total, 2);
        assert_eq!(progress.completed, 0);
        assert!((progress.percent - 0.0).abs() < f64::EPSILON);
    }
}
