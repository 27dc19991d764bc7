use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use db::models::batch_job::BatchJob;
use services::services::config::AppSettings;
use services::services::poster_processor::PosterProcessor;
use services::services::progress::ProgressTracker;
use sqlx::SqlitePool;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::batch_worker::BatchWorker;

/// How often the dispatcher re-reads the queue even without a wake-up.
/// Covers enqueue messages lost to process restarts and resumed jobs.
const POLL_INTERVAL: Duration = Duration::from_secs(5);

/// Producer handle into the dispatch queue. Many producers (submissions,
/// resumes, boot recovery), one consumer.
#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<Uuid>,
}

impl JobQueue {
    pub fn enqueue(&self, job_id: Uuid) {
        if self.tx.send(job_id).is_err() {
            tracing::warn!(job_id = %job_id, "dispatcher is gone, job stays queued for recovery");
        }
    }
}

pub fn job_queue() -> (JobQueue, mpsc::UnboundedReceiver<Uuid>) {
    let (tx, rx) = mpsc::unbounded_channel();
    (JobQueue { tx }, rx)
}

/// Pulls queued jobs in priority order and runs one batch worker per job,
/// capped at `max_concurrent_jobs` in flight.
pub struct Dispatcher {
    pool: SqlitePool,
    processor: PosterProcessor,
    tracker: ProgressTracker,
    settings: Arc<AppSettings>,
    rx: mpsc::UnboundedReceiver<Uuid>,
}

impl Dispatcher {
    pub fn new(
        pool: SqlitePool,
        processor: PosterProcessor,
        tracker: ProgressTracker,
        settings: Arc<AppSettings>,
        rx: mpsc::UnboundedReceiver<Uuid>,
    ) -> Self {
        Self {
            pool,
            processor,
            tracker,
            settings,
            rx,
        }
    }

    fn spawn_worker(&self, in_flight: &mut JoinSet<Uuid>, job: &BatchJob) {
        tracing::info!(
            job_id = %job.id,
            priority = job.priority,
            posters = job.total_posters,
            "dispatching batch job"
        );
        let worker = BatchWorker::new(
            self.pool.clone(),
            self.processor.clone(),
            self.tracker.clone(),
            self.settings.clone(),
        );
        let job_id = job.id;
        in_flight.spawn(async move { worker.run(job_id).await });
    }

    /// Run until the queue handle is dropped and all workers have drained.
    pub async fn run(mut self) {
        let cap = self.settings.max_concurrent_jobs.max(1);
        let mut in_flight: JoinSet<Uuid> = JoinSet::new();
        let mut running: HashSet<Uuid> = HashSet::new();
        let mut poll = tokio::time::interval(POLL_INTERVAL);
        poll.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        tracing::info!(cap, "dispatcher started");
        loop {
            // Fill free slots in priority-then-FIFO order.
            if in_flight.len() < cap {
                match BatchJob::list_queued(&self.pool).await {
                    Ok(queued) => {
                        for job in &queued {
                            if in_flight.len() >= cap {
                                break;
                            }
                            if !running.insert(job.id) {
                                continue;
                            }
                            self.spawn_worker(&mut in_flight, job);
                        }
                    }
                    Err(err) => tracing::error!("failed to read job queue: {err}"),
                }
            }

            tokio::select! {
                message = self.rx.recv() => {
                    match message {
                        Some(job_id) => {
                            tracing::debug!(job_id = %job_id, "queue wake-up");
                        }
                        None => {
                            // all producers gone: drain in-flight work and stop
                            while let Some(result) = in_flight.join_next().await {
                                match result {
                                    Ok(job_id) => {
                                        running.remove(&job_id);
                                    }
                                    Err(err) => tracing::error!("batch worker panicked: {err}"),
                                }
                            }
                            tracing::info!("dispatcher stopped");
                            return;
                        }
                    }
                }
                Some(result) = in_flight.join_next(), if !in_flight.is_empty() => {
                    match result {
                        Ok(job_id) => {
                            running.remove(&job_id);
                            tracing::debug!(job_id = %job_id, "worker slot freed");
                        }
                        Err(err) => tracing::error!("batch worker panicked: {err}"),
                    }
                }
                _ = poll.tick() => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job_creator::{JobSubmission, create_batch_job};
    use crate::test_support::{ScriptedServer, TestHarness};
    use db::models::batch_job::{JobSource, JobStatus};

    fn submission(poster: &str, source: JobSource, tier: Option<&str>) -> JobSubmission {
        JobSubmission {
            user_id: "u1".into(),
            name: format!("job {poster}"),
            poster_ids: vec![poster.to_string()],
            badge_types: vec!["resolution".into()],
            source,
            user_tier: tier.map(String::from),
        }
    }

    async fn wait_terminal(pool: &SqlitePool, ids: &[Uuid]) {
        for _ in 0..500 {
            let mut all_done = true;
            for id in ids {
                let job = BatchJob::find_by_id(pool, *id).await.unwrap();
                if !job.status.is_terminal() {
                    all_done = false;
                }
            }
            if all_done {
                return;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("jobs did not reach a terminal state in time");
    }

    #[tokio::test]
    async fn higher_priority_job_runs_first_with_cap_one() {
        // both jobs are queued before the dispatcher starts, so selection
        // order is purely priority-driven
        let harness = TestHarness::new(ScriptedServer::default()).await;
        let (queue, rx) = job_queue();

        let mut settings = (*harness.settings).clone();
        settings.max_concurrent_jobs = 1;
        let settings = Arc::new(settings);

        // enqueue A (scheduled, priority 7) first, then B (manual premium, 3)
        let job_a = create_batch_job(
            &harness.pool,
            &queue,
            submission("A1", JobSource::Scheduled, None),
        )
        .await
        .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        let job_b = create_batch_job(
            &harness.pool,
            &queue,
            submission("B1", JobSource::Manual, Some("premium")),
        )
        .await
        .unwrap();
        assert_eq!(job_a.job.priority, 7);
        assert_eq!(job_b.job.priority, 3);

        let dispatcher = Dispatcher::new(
            harness.pool.clone(),
            harness.processor.clone(),
            harness.tracker.clone(),
            settings,
            rx,
        );
        let handle = tokio::spawn(dispatcher.run());

        wait_terminal(&harness.pool, &[job_a.job.id, job_b.job.id]).await;
        drop(queue);
        handle.await.unwrap();

        let a = BatchJob::find_by_id(&harness.pool, job_a.job.id).await.unwrap();
        let b = BatchJob::find_by_id(&harness.pool, job_b.job.id).await.unwrap();
        assert_eq!(a.status, JobStatus::Completed);
        assert_eq!(b.status, JobStatus::Completed);

        // with cap 1, B must have finished before A started
        assert!(
            b.completed_at.unwrap() <= a.started_at.unwrap(),
            "premium job should run before the scheduled one: b done {:?}, a started {:?}",
            b.completed_at,
            a.started_at
        );
    }

    #[tokio::test]
    async fn dispatcher_drains_and_stops_when_queue_closes() {
        let harness = TestHarness::new(ScriptedServer::default()).await;
        let (queue, rx) = job_queue();
        let created = create_batch_job(
            &harness.pool,
            &queue,
            submission("P1", JobSource::Manual, None),
        )
        .await
        .unwrap();

        let dispatcher = Dispatcher::new(
            harness.pool.clone(),
            harness.processor.clone(),
            harness.tracker.clone(),
            harness.settings.clone(),
            rx,
        );
        let handle = tokio::spawn(dispatcher.run());

        wait_terminal(&harness.pool, &[created.job.id]).await;
        drop(queue);
        handle.await.unwrap();

        let job = BatchJob::find_by_id(&harness.pool, created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Completed);
    }

    #[tokio::test]
    async fn cancelled_queued_job_is_never_dispatched() {
        let server = ScriptedServer::default();
        let harness = TestHarness::new(server.clone()).await;
        let (queue, rx) = job_queue();
        let created = create_batch_job(
            &harness.pool,
            &queue,
            submission("P1", JobSource::Manual, None),
        )
        .await
        .unwrap();
        assert!(BatchJob::request_cancel(&harness.pool, created.job.id).await.unwrap());

        let dispatcher = Dispatcher::new(
            harness.pool.clone(),
            harness.processor.clone(),
            harness.tracker.clone(),
            harness.settings.clone(),
            rx,
        );
        let handle = tokio::spawn(dispatcher.run());
        tokio::time::sleep(Duration::from_millis(100)).await;
        drop(queue);
        handle.await.unwrap();

        assert_eq!(server.download_count("P1"), 0);
        let job = BatchJob::find_by_id(&harness.pool, created.job.id).await.unwrap();
        assert_eq!(job.status, JobStatus::Cancelled);
    }
}
