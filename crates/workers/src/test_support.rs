use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use db::DBService;
use services::services::config::AppSettings;
use services::services::hub::ProgressHub;
use services::services::jellyfin::{JellyfinError, MediaItem, MediaServer, MediaStream};
use services::services::poster_processor::PosterProcessor;
use services::services::progress::ProgressTracker;
use sqlx::SqlitePool;
use tokio::sync::Notify;

use crate::batch_worker::BatchWorker;

/// Rendezvous point for a scripted download: the test waits for the worker
/// to enter the call, then decides when it may proceed.
#[derive(Clone, Default)]
pub(crate) struct DownloadGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl DownloadGate {
    pub(crate) async fn entered(&self) {
        self.entered.notified().await;
    }

    pub(crate) fn release(&self) {
        self.release.notify_one();
    }
}

#[derive(Default)]
struct ServerState {
    not_found: Mutex<HashSet<String>>,
    upload_failures: Mutex<HashMap<String, usize>>,
    download_counts: Mutex<HashMap<String, usize>>,
    gates: Mutex<HashMap<String, DownloadGate>>,
}

/// Media server stub with per-poster scripted failures.
#[derive(Clone, Default)]
pub(crate) struct ScriptedServer {
    state: Arc<ServerState>,
}

impl ScriptedServer {
    /// The next `count` uploads of `poster_id` fail with a transport error.
    pub(crate) fn fail_uploads(&self, poster_id: &str, count: usize) {
        self.state
            .upload_failures
            .lock()
            .unwrap()
            .insert(poster_id.to_string(), count);
    }

    /// Downloads of `poster_id` return `NotFound`.
    pub(crate) fn set_not_found(&self, poster_id: &str) {
        self.state
            .not_found
            .lock()
            .unwrap()
            .insert(poster_id.to_string());
    }

    /// Block downloads of `poster_id` until the returned gate is released.
    pub(crate) fn gate_download(&self, poster_id: &str) -> DownloadGate {
        let gate = DownloadGate::default();
        self.state
            .gates
            .lock()
            .unwrap()
            .insert(poster_id.to_string(), gate.clone());
        gate
    }

    pub(crate) fn download_count(&self, poster_id: &str) -> usize {
        self.state
            .download_counts
            .lock()
            .unwrap()
            .get(poster_id)
            .copied()
            .unwrap_or(0)
    }

    fn poster_bytes() -> Vec<u8> {
        use image::{DynamicImage, Rgba, RgbaImage};
        let img =
            DynamicImage::ImageRgba8(RgbaImage::from_pixel(80, 120, Rgba([60, 60, 60, 255])))
                .to_rgb8();
        let mut bytes = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut bytes, 90);
        img.write_with_encoder(encoder).unwrap();
        bytes
    }
}

#[async_trait]
impl MediaServer for ScriptedServer {
    async fn get_media(&self, id: &str) -> Result<MediaItem, JellyfinError> {
        Ok(MediaItem {
            id: id.to_string(),
            name: format!("Item {id}"),
            item_type: "Movie".into(),
            media_streams: vec![MediaStream {
                stream_type: "Video".into(),
                height: Some(1080),
                ..MediaStream::default()
            }],
            ..MediaItem::default()
        })
    }

    async fn download_primary(&self, id: &str) -> Result<Vec<u8>, JellyfinError> {
        *self
            .state
            .download_counts
            .lock()
            .unwrap()
            .entry(id.to_string())
            .or_insert(0) += 1;

        let gate = self.state.gates.lock().unwrap().get(id).cloned();
        if let Some(gate) = gate {
            gate.entered.notify_one();
            gate.release.notified().await;
        }

        if self.state.not_found.lock().unwrap().contains(id) {
            return Err(JellyfinError::NotFound(id.to_string()));
        }
        Ok(Self::poster_bytes())
    }

    async fn upload_primary(&self, id: &str, _image: Vec<u8>) -> Result<(), JellyfinError> {
        let mut failures = self.state.upload_failures.lock().unwrap();
        if let Some(remaining) = failures.get_mut(id) {
            if *remaining > 0 {
                *remaining = remaining.saturating_sub(1);
                return Err(JellyfinError::Transport("simulated upload failure".into()));
            }
        }
        Ok(())
    }

    async fn add_tag(&self, _id: &str, _tag: &str) -> Result<(), JellyfinError> {
        Ok(())
    }
}

/// Shared wiring for worker and dispatcher tests: in-memory repository,
/// tracker + hub, and a processor backed by a scripted server.
pub(crate) struct TestHarness {
    pub(crate) pool: SqlitePool,
    pub(crate) tracker: ProgressTracker,
    pub(crate) settings: Arc<AppSettings>,
    pub(crate) processor: PosterProcessor,
    _tmp: tempfile::TempDir,
}

impl TestHarness {
    pub(crate) async fn new(server: ScriptedServer) -> Self {
        let db = DBService::new_in_memory().await.unwrap();
        let tracker = ProgressTracker::new(db.pool.clone(), ProgressHub::new());
        let tmp = tempfile::tempdir().unwrap();

        let mut settings = AppSettings::default();
        settings.poster_download_backoff_initial_ms = 1;
        settings.inter_poster_throttle_ms = 1;
        let settings = Arc::new(settings);

        let processor = PosterProcessor::new(
            Arc::new(server),
            Vec::new(),
            settings.clone(),
            tmp.path().join("cache"),
            tmp.path().join("out"),
        )
        .unwrap();

        Self {
            pool: db.pool,
            tracker,
            settings,
            processor,
            _tmp: tmp,
        }
    }

    pub(crate) fn worker(&self) -> BatchWorker {
        BatchWorker::new(
            self.pool.clone(),
            self.processor.clone(),
            self.tracker.clone(),
            self.settings.clone(),
        )
    }
}
