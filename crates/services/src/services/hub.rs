use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::broadcast;
use uuid::Uuid;

use crate::services::progress::ProgressEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Fan-out point for progress events, keyed by job id.
///
/// Each job gets its own broadcast channel with a single writer (the owning
/// worker), so subscribers observe transitions in causal order. A subscriber
/// that stops draining simply lags and is dropped by its own socket task;
/// the worker never blocks on a slow client.
#[derive(Clone, Default)]
pub struct ProgressHub {
    inner: Arc<DashMap<Uuid, broadcast::Sender<ProgressEvent>>>,
}

impl ProgressHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, job_id: Uuid) -> broadcast::Receiver<ProgressEvent> {
        self.inner
            .entry(job_id)
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Deliver an event to all subscribers of its job. Returns the number of
    /// live receivers; send errors (no subscribers) are not failures.
    pub fn publish(&self, event: &ProgressEvent) -> usize {
        match self.inner.get(&event.job_id()) {
            Some(sender) => sender.send(event.clone()).unwrap_or(0),
            None => 0,
        }
    }

    /// Tear down a job's channel after its final event. Late subscribers to a
    /// terminal job get a snapshot straight from the repository instead.
    pub fn finish(&self, job_id: Uuid) {
        self.inner.remove(&job_id);
    }

    pub fn subscriber_count(&self, job_id: Uuid) -> usize {
        self.inner
            .get(&job_id)
            .map(|sender| sender.receiver_count())
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::progress::{JobProgress, ProgressEvent};
    use chrono::Utc;
    use db::models::batch_job::JobStatus;
    use db::models::poster_status::PosterState;

    fn progress(job_id: Uuid) -> JobProgress {
        JobProgress {
            job_id,
            status: JobStatus::Processing,
            total: 2,
            completed: 1,
            failed: 0,
            percent: 50.0,
            eta: None,
        }
    }

    fn poster_event(job_id: Uuid) -> ProgressEvent {
        ProgressEvent::PosterUpdate {
            job_id,
            poster_id: "p1".into(),
            status: PosterState::Completed,
            progress: progress(job_id),
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn events_fan_out_to_all_subscribers() {
        let hub = ProgressHub::new();
        let job_id = Uuid::new_v4();
        let mut rx1 = hub.subscribe(job_id);
        let mut rx2 = hub.subscribe(job_id);

        assert_eq!(hub.publish(&poster_event(job_id)), 2);
        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn events_are_scoped_to_their_job() {
        let hub = ProgressHub::new();
        let job_a = Uuid::new_v4();
        let job_b = Uuid::new_v4();
        let mut rx_b = hub.subscribe(job_b);

        hub.publish(&poster_event(job_a));
        assert!(rx_b.try_recv().is_err());
    }

    #[tokio::test]
    async fn publish_without_subscribers_is_a_noop() {
        let hub = ProgressHub::new();
        assert_eq!(hub.publish(&poster_event(Uuid::new_v4())), 0);
    }

    #[tokio::test]
    async fn finish_tears_down_the_channel() {
        let hub = ProgressHub::new();
        let job_id = Uuid::new_v4();
        let _rx = hub.subscribe(job_id);
        assert_eq!(hub.subscriber_count(job_id), 1);

        hub.finish(job_id);
        assert_eq!(hub.subscriber_count(job_id), 0);
    }

    #[tokio::test]
    async fn per_job_events_arrive_in_publish_order() {
        let hub = ProgressHub::new();
        let job_id = Uuid::new_v4();
        let mut rx = hub.subscribe(job_id);

        for state in [PosterState::Processing, PosterState::Completed] {
            hub.publish(&ProgressEvent::PosterUpdate {
                job_id,
                poster_id: "p1".into(),
                status: state,
                progress: progress(job_id),
                timestamp: Utc::now(),
            });
        }

        match rx.recv().await.unwrap() {
            ProgressEvent::PosterUpdate { status, .. } => {
                assert_eq!(status, PosterState::Processing)
            }
            other => panic!("unexpected event {other:?}"),
        }
        match rx.recv().await.unwrap() {
            ProgressEvent::PosterUpdate { status, .. } => {
                assert_eq!(status, PosterState::Completed)
            }
            other => panic!("unexpected event {other:?}"),
        }
    }
}
