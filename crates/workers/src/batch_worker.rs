use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use db::models::batch_job::{BatchJob, BatchJobError, JobStatus};
use db::models::poster_status::{self, PosterState, PosterStatus, PosterStatusError};
use services::services::config::AppSettings;
use services::services::poster_processor::PosterProcessor;
use services::services::progress::ProgressTracker;
use sqlx::SqlitePool;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
enum WorkerError {
    #[error(transparent)]
    Job(#[from] BatchJobError),
    #[error(transparent)]
    Poster(#[from] PosterStatusError),
}

/// Why the poster loop stopped.
enum LoopOutcome {
    /// Every poster in the sequence was attempted.
    Finished,
    Cancelled,
    Paused,
}

/// Executes one batch job end to end. The worker is the sole writer of its
/// job's counters and poster rows; administrative cancel/pause only touch
/// the job row and are observed between posters.
pub struct BatchWorker {
    pool: SqlitePool,
    processor: PosterProcessor,
    tracker: ProgressTracker,
    settings: Arc<AppSettings>,
}

impl BatchWorker {
    pub fn new(
        pool: SqlitePool,
        processor: PosterProcessor,
        tracker: ProgressTracker,
        settings: Arc<AppSettings>,
    ) -> Self {
        Self {
            pool,
            processor,
            tracker,
            settings,
        }
    }

    /// Run the job. Never panics outward: a fatal error (repository loss)
    /// fails the job as a whole. Returns the job id for the dispatcher's
    /// bookkeeping.
    pub async fn run(self, job_id: Uuid) -> Uuid {
        if let Err(err) = self.execute(job_id).await {
            tracing::error!(job_id = %job_id, "batch job failed fatally: {err}");
            let _ = BatchJob::finalize(
                &self.pool,
                job_id,
                JobStatus::Failed,
                Some(format!("fatal worker error: {err}")),
            )
            .await;
            let _ = self.tracker.job_finished(job_id).await;
        }
        job_id
    }

    async fn execute(&self, job_id: Uuid) -> Result<(), WorkerError> {
        let job = match BatchJob::find_by_id(&self.pool, job_id).await {
            Ok(job) => job,
            Err(BatchJobError::NotFound(_)) => {
                tracing::error!(job_id = %job_id, "job vanished before execution, aborting");
                return Ok(());
            }
            Err(err) => return Err(err.into()),
        };

        if !BatchJob::mark_started(&self.pool, job_id).await? {
            // Cancelled (or re-claimed) while waiting in the queue.
            let status = BatchJob::current_status(&self.pool, job_id).await?;
            tracing::info!(job_id = %job_id, %status, "job no longer queued, skipping");
            if status.is_terminal() {
                let _ = self.tracker.job_finished(job_id).await;
            }
            return Ok(());
        }

        let poster_ids = job.selected_poster_ids.0.clone();
        if poster_ids.is_empty() {
            BatchJob::finalize(
                &self.pool,
                job_id,
                JobStatus::Failed,
                Some("no poster ids in job".to_string()),
            )
            .await?;
            let _ = self.tracker.job_finished(job_id).await;
            return Ok(());
        }

        tracing::info!(
            job_id = %job_id,
            posters = poster_ids.len(),
            badges = ?job.badge_types.0,
            "processing batch job"
        );

        let badge_types = job.badge_types.0.clone();
        let throttle = Duration::from_millis(self.settings.inter_poster_throttle_ms);
        let max_retries = self
            .settings
            .max_retries_per_poster
            .min(poster_status::MAX_RETRIES);
        let mut failure_categories: BTreeMap<&'static str, u32> = BTreeMap::new();
        let mut outcome = LoopOutcome::Finished;

        'posters: for (index, poster_id) in poster_ids.iter().enumerate() {
            // Resume path: posters that already reached a terminal state in a
            // previous pass stay untouched.
            match PosterStatus::find(&self.pool, job_id, poster_id).await? {
                Some(row) if row.status.is_terminal() => continue,
                Some(_) => {}
                None => {
                    PosterStatus::seed_pending(&self.pool, job_id, std::slice::from_ref(poster_id))
                        .await?
                }
            }

            // Runtime cap on same-poster attempts within one pass.
            let mut attempts_left = max_retries + 1;
            loop {
                // Cooperative cancellation: checked between posters, never
                // mid-poster, so an upstream image is never left half-replaced.
                match BatchJob::current_status(&self.pool, job_id).await? {
                    JobStatus::Cancelled => {
                        outcome = LoopOutcome::Cancelled;
                        break 'posters;
                    }
                    JobStatus::Paused => {
                        outcome = LoopOutcome::Paused;
                        break 'posters;
                    }
                    _ => {}
                }

                PosterStatus::mark_processing(&self.pool, job_id, poster_id).await?;
                let _ = self
                    .tracker
                    .poster_update(job_id, poster_id, PosterState::Processing)
                    .await;

                let result = self
                    .processor
                    .process_poster(poster_id, &badge_types, job_id, &self.tracker)
                    .await;
                attempts_left -= 1;

                match result {
                    Ok(success) => {
                        PosterStatus::mark_completed(
                            &self.pool,
                            job_id,
                            poster_id,
                            &success.output_path.to_string_lossy(),
                        )
                        .await?;
                        BatchJob::record_poster_completed(&self.pool, job_id).await?;
                        let _ = self
                            .tracker
                            .poster_update(job_id, poster_id, PosterState::Completed)
                            .await;
                        tracing::info!(
                            job_id = %job_id,
                            poster_id = %poster_id,
                            applied = ?success.applied_badges,
                            "poster completed"
                        );
                        break;
                    }
                    Err(err) => {
                        let row = PosterStatus::get(&self.pool, job_id, poster_id).await?;
                        if err.is_retryable() && row.retry_count < max_retries && attempts_left > 0
                        {
                            let attempt = PosterStatus::mark_retrying(
                                &self.pool,
                                job_id,
                                poster_id,
                                &err.to_string(),
                            )
                            .await?;
                            let _ = self
                                .tracker
                                .poster_update(job_id, poster_id, PosterState::Retrying)
                                .await;
                            tracing::warn!(
                                job_id = %job_id,
                                poster_id = %poster_id,
                                attempt,
                                "poster failed with retryable error, retrying: {err}"
                            );
                            continue;
                        }

                        *failure_categories.entry(err.category()).or_insert(0) += 1;
                        PosterStatus::mark_failed(&self.pool, job_id, poster_id, &err.to_string())
                            .await?;
                        BatchJob::record_poster_failed(&self.pool, job_id).await?;
                        let _ = self
                            .tracker
                            .poster_update(job_id, poster_id, PosterState::Failed)
                            .await;
                        tracing::error!(
                            job_id = %job_id,
                            poster_id = %poster_id,
                            retries = row.retry_count,
                            "poster failed permanently: {err}"
                        );
                        break;
                    }
                }
            }

            if index + 1 < poster_ids.len() {
                tokio::time::sleep(throttle).await;
            }
        }

        match outcome {
            LoopOutcome::Paused => {
                // The job keeps its counters and pending posters; resume puts
                // it back in the queue.
                tracing::info!(job_id = %job_id, "job paused, leaving remaining posters pending");
                Ok(())
            }
            LoopOutcome::Cancelled => {
                tracing::info!(job_id = %job_id, "job cancelled, stopping");
                BatchJob::finalize(&self.pool, job_id, JobStatus::Cancelled, None).await?;
                let _ = self.tracker.job_finished(job_id).await;
                Ok(())
            }
            LoopOutcome::Finished => {
                let refreshed = BatchJob::find_by_id(&self.pool, job_id).await?;
                let (status, summary) = if refreshed.failed_posters == 0 {
                    (JobStatus::Completed, None)
                } else {
                    (
                        JobStatus::Failed,
                        Some(summarise_failures(
                            refreshed.failed_posters,
                            &failure_categories,
                        )),
                    )
                };
                BatchJob::finalize(&self.pool, job_id, status, summary).await?;
                let _ = self.tracker.job_finished(job_id).await;
                tracing::info!(
                    job_id = %job_id,
                    completed = refreshed.completed_posters,
                    failed = refreshed.failed_posters,
                    %status,
                    "batch job finished"
                );
                Ok(())
            }
        }
    }
}

fn summarise_failures(failed: i64, categories: &BTreeMap<&'static str, u32>) -> String {
    let breakdown: Vec<String> = categories
        .iter()
        .map(|(category, count)| format!("{category} x{count}"))
        .collect();
    format!("{failed} poster(s) failed: {}", breakdown.join(", "))
}
