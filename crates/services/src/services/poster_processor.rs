use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use chrono::{DateTime, Utc};
use db::models::batch_job::BadgeType;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::services::badges::{self, Badge, BadgePayload};
use crate::services::composer::{self, BadgeStyle, ComposeError};
use crate::services::config::AppSettings;
use crate::services::jellyfin::{JellyfinError, MediaItem, MediaServer};
use crate::services::progress::{PosterStage, ProgressTracker};
use crate::services::providers::ReviewSourceClient;

/// Tag written to Jellyfin items whose poster has been enriched.
pub const OVERLAY_TAG: &str = "aphrodite-overlay";

#[derive(Debug, Error)]
pub enum ProcessError {
    #[error("transient network error: {0}")]
    TransientNetwork(String),
    #[error("permanent remote error: {0}")]
    PermanentRemote(String),
    #[error("rate limited: {0}")]
    RateLimited(String),
    #[error("metadata missing: {0}")]
    MetadataMissing(String),
    #[error("compose failed: {0}")]
    Compose(String),
    #[error("repository error: {0}")]
    Repository(String),
    #[error("io error: {0}")]
    Io(String),
}

impl ProcessError {
    /// Transient and rate-limit failures retry, unless the message carries a
    /// filesystem category that never recovers on its own.
    pub fn is_retryable(&self) -> bool {
        let retryable_kind = matches!(
            self,
            ProcessError::TransientNetwork(_) | ProcessError::RateLimited(_)
        );
        let message = self.to_string().to_lowercase();
        retryable_kind
            && !message.contains("file_missing")
            && !message.contains("permission_denied")
    }

    /// Coarse category used for the job's error summary. Filesystem errors
    /// keep the bucket stamped on them by the `io::Error` conversion, so
    /// missing-file and permission failures stay distinguishable.
    pub fn category(&self) -> &'static str {
        match self {
            ProcessError::TransientNetwork(_) => "network_error",
            ProcessError::PermanentRemote(_) => "remote_error",
            ProcessError::RateLimited(_) => "rate_limited",
            ProcessError::MetadataMissing(_) => "metadata_missing",
            ProcessError::Compose(_) => "compose_error",
            ProcessError::Repository(_) => "repository_error",
            ProcessError::Io(message) => {
                if message.starts_with("file_missing") {
                    "file_missing"
                } else if message.starts_with("permission_denied") {
                    "permission_denied"
                } else {
                    "io_error"
                }
            }
        }
    }
}

impl From<JellyfinError> for ProcessError {
    fn from(err: JellyfinError) -> Self {
        match err {
            JellyfinError::Transport(msg) => ProcessError::TransientNetwork(msg),
            JellyfinError::RateLimited => ProcessError::RateLimited(err.to_string()),
            JellyfinError::NotFound(_)
            | JellyfinError::Unauthorized
            | JellyfinError::BadRequest(_)
            | JellyfinError::NotConfigured => ProcessError::PermanentRemote(err.to_string()),
        }
    }
}

impl From<ComposeError> for ProcessError {
    fn from(err: ComposeError) -> Self {
        ProcessError::Compose(err.to_string())
    }
}

impl From<std::io::Error> for ProcessError {
    fn from(err: std::io::Error) -> Self {
        let category = match err.kind() {
            std::io::ErrorKind::NotFound => "file_missing",
            std::io::ErrorKind::PermissionDenied => "permission_denied",
            _ => "io",
        };
        ProcessError::Io(format!("{category}: {err}"))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PosterOutcome {
    pub output_path: PathBuf,
    pub applied_badges: Vec<BadgeType>,
}

/// Sidecar written next to every cached original.
#[derive(Debug, Serialize, Deserialize)]
struct CacheMeta {
    jellyfin_id: String,
    original_poster_id: String,
    cached_at: DateTime<Utc>,
}

/// Per-item orchestrator: download → extract → compose → upload → tag.
#[derive(Clone)]
pub struct PosterProcessor {
    inner: Arc<ProcessorInner>,
}

struct ProcessorInner {
    server: Arc<dyn MediaServer>,
    review_clients: Vec<Arc<dyn ReviewSourceClient>>,
    settings: Arc<AppSettings>,
    cache_dir: PathBuf,
    output_dir: PathBuf,
}

impl PosterProcessor {
    pub fn new(
        server: Arc<dyn MediaServer>,
        review_clients: Vec<Arc<dyn ReviewSourceClient>>,
        settings: Arc<AppSettings>,
        cache_dir: PathBuf,
        output_dir: PathBuf,
    ) -> std::io::Result<Self> {
        std::fs::create_dir_all(&cache_dir)?;
        std::fs::create_dir_all(&output_dir)?;
        Ok(Self {
            inner: Arc::new(ProcessorInner {
                server,
                review_clients,
                settings,
                cache_dir,
                output_dir,
            }),
        })
    }

    /// Run the full pipeline for one poster attempt.
    ///
    /// A fresh download happens on every attempt; the cache file exists for
    /// restore tooling, never as a cross-job source.
    pub async fn process_poster(
        &self,
        poster_id: &str,
        badge_types: &[BadgeType],
        job_id: Uuid,
        tracker: &ProgressTracker,
    ) -> Result<PosterOutcome, ProcessError> {
        tracker.poster_stage(job_id, poster_id, PosterStage::Started);

        let original = self.download_original(poster_id).await?;
        self.cache_original(poster_id, &original).await?;

        let item = self
            .with_timeout(self.inner.server.get_media(poster_id))
            .await?;

        let (badges, applied_badges) = self.extract_badges(&item, badge_types).await;
        if applied_badges.is_empty() {
            tracing::debug!(
                poster_id,
                "no badge produced content, uploading unmodified composition"
            );
        }

        let output_path = self.inner.output_dir.join(format!("{}.jpg", Uuid::new_v4()));
        let composed = compose_blocking(original, badges, output_path.clone()).await?;
        tracker.poster_stage(job_id, poster_id, PosterStage::Composed);

        self.with_timeout(self.inner.server.upload_primary(poster_id, composed))
            .await?;
        tracker.poster_stage(job_id, poster_id, PosterStage::Uploaded);

        // The image is already written upstream: a tag failure downgrades to
        // a warning, the poster still counts as completed.
        if let Err(err) = self
            .with_timeout(self.inner.server.add_tag(poster_id, OVERLAY_TAG))
            .await
        {
            tracing::warn!(poster_id, "failed to tag item after upload: {err}");
        }

        Ok(PosterOutcome {
            output_path,
            applied_badges,
        })
    }

    async fn with_timeout<T>(
        &self,
        fut: impl Future<Output = Result<T, JellyfinError>>,
    ) -> Result<T, ProcessError> {
        let limit = Duration::from_secs(self.inner.settings.external_io_timeout_secs);
        match tokio::time::timeout(limit, fut).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(ProcessError::TransientNetwork(format!(
                "operation timed out after {}s",
                limit.as_secs()
            ))),
        }
    }

    async fn download_original(&self, poster_id: &str) -> Result<Vec<u8>, ProcessError> {
        let settings = &self.inner.settings;
        (|| async {
            self.with_timeout(self.inner.server.download_primary(poster_id))
                .await
        })
        .retry(
            &ExponentialBuilder::default()
                .with_min_delay(Duration::from_millis(
                    settings.poster_download_backoff_initial_ms,
                ))
                .with_max_delay(Duration::from_secs(30))
                .with_max_times(settings.poster_download_retries)
                .with_jitter(),
        )
        .when(|e: &ProcessError| e.is_retryable())
        .notify(|err: &ProcessError, dur: Duration| {
            tracing::warn!(
                "poster download failed, retrying after {:.2}s: {}",
                dur.as_secs_f64(),
                err
            );
        })
        .await
    }

    async fn cache_original(&self, poster_id: &str, bytes: &[u8]) -> Result<(), ProcessError> {
        let stem = format!(
            "batch_{poster_id}_{}",
            utils::assets::short_uuid(&Uuid::new_v4())
        );
        let path = self.inner.cache_dir.join(format!("{stem}.jpg"));
        tokio::fs::write(&path, bytes).await?;

        let meta = CacheMeta {
            jellyfin_id: poster_id.to_string(),
            original_poster_id: stem,
            cached_at: Utc::now(),
        };
        let meta_path = path.with_extension("meta");
        let body = serde_json::to_vec_pretty(&meta)
            .map_err(|e| ProcessError::Io(format!("meta encode: {e}")))?;
        tokio::fs::write(&meta_path, body).await?;
        Ok(())
    }

    /// Run every requested extractor. Missing metadata and provider failures
    /// skip that badge only.
    async fn extract_badges(
        &self,
        item: &MediaItem,
        badge_types: &[BadgeType],
    ) -> (Vec<(Badge, BadgeStyle)>, Vec<BadgeType>) {
        let settings = &self.inner.settings;
        let mut out = Vec::new();
        let mut applied = Vec::new();

        for badge_type in badge_types {
            let payload = match badge_type {
                BadgeType::Audio => badges::audio::extract(item).map(BadgePayload::Audio),
                BadgeType::Resolution => {
                    badges::resolution::extract(item).map(BadgePayload::Resolution)
                }
                BadgeType::Review => {
                    let scores =
                        badges::review::extract(item, &self.inner.review_clients, &settings.review)
                            .await;
                    if scores.is_empty() {
                        None
                    } else {
                        Some(BadgePayload::Review(scores))
                    }
                }
                BadgeType::Awards => {
                    badges::awards::extract(item, &settings.awards).map(BadgePayload::Awards)
                }
            };

            match payload {
                Some(payload) => {
                    applied.push(*badge_type);
                    out.push((
                        Badge {
                            badge_type: *badge_type,
                            payload,
                        },
                        settings.badge_style(*badge_type).clone(),
                    ));
                }
                None => {
                    tracing::debug!(item = %item.id, "badge {badge_type} not applicable, skipping");
                }
            }
        }

        (out, applied)
    }
}

/// Decode, compose and encode off the async runtime. Returns the JPEG bytes
/// that were written to `output_path`.
async fn compose_blocking(
    original: Vec<u8>,
    badges: Vec<(Badge, BadgeStyle)>,
    output_path: PathBuf,
) -> Result<Vec<u8>, ProcessError> {
    tokio::task::spawn_blocking(move || -> Result<Vec<u8>, ProcessError> {
        let source = image::load_from_memory(&original)
            .map_err(|e| ProcessError::Compose(format!("source image decode: {e}")))?;
        let composed = composer::compose(&source, &badges)?;

        let rgb = DynamicImage::ImageRgba8(composed).to_rgb8();
        let mut encoded = Vec::new();
        let encoder = image::codecs::jpeg::JpegEncoder::new_with_quality(&mut encoded, 90);
        rgb.write_with_encoder(encoder)
            .map_err(|e| ProcessError::Compose(format!("jpeg encode: {e}")))?;

        std::fs::write(&output_path, &encoded)?;
        Ok(encoded)
    })
    .await
    .map_err(|e| ProcessError::Compose(format!("compose task failed: {e}")))?
}
