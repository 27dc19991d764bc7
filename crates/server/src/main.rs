use std::sync::Arc;

use anyhow::Context;
use db::{DBService, models::batch_job::BatchJob};
use server::{AppState, router};
use services::services::{
    config::AppSettings,
    hub::ProgressHub,
    jellyfin::{JellyfinClient, MediaServer},
    poster_processor::PosterProcessor,
    progress::ProgressTracker,
    providers::{OmdbClient, ReviewSourceClient, TmdbClient},
};
use tracing_subscriber::{EnvFilter, prelude::*};
use workers::dispatcher::{Dispatcher, job_queue};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from `.env` if present so local development
    // picks up API keys
    dotenv::dotenv().ok();

    let log_level = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let filter_string = format!(
        "warn,server={level},services={level},db={level},workers={level},utils={level}",
        level = log_level
    );
    let env_filter = EnvFilter::try_new(filter_string).context("invalid tracing filter")?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_filter(env_filter))
        .init();

    utils::assets::ensure_layout().context("failed to create data directories")?;

    let settings = Arc::new(AppSettings::load().context("failed to load settings")?);
    let db = DBService::new().await.context("failed to open database")?;

    // Jobs left mid-flight by a previous process go back to the queue.
    let interrupted = BatchJob::requeue_interrupted(&db.pool).await?;
    if !interrupted.is_empty() {
        tracing::info!(count = interrupted.len(), "requeued interrupted jobs");
    }

    let hub = ProgressHub::new();
    let tracker = ProgressTracker::new(db.pool.clone(), hub);

    let jellyfin: Arc<dyn MediaServer> = Arc::new(
        JellyfinClient::new(&settings.jellyfin)
            .context("Jellyfin connection not configured (jellyfin.url / jellyfin.api_key)")?,
    );

    let mut review_clients: Vec<Arc<dyn ReviewSourceClient>> = Vec::new();
    match TmdbClient::new(&settings.providers.tmdb_api_key) {
        Ok(client) => review_clients.push(Arc::new(client)),
        Err(err) => tracing::warn!("TMDB reviews disabled: {err}"),
    }
    match OmdbClient::new(&settings.providers.omdb_api_key) {
        Ok(client) => review_clients.push(Arc::new(client)),
        Err(err) => tracing::warn!("OMDB reviews disabled: {err}"),
    }

    let processor = PosterProcessor::new(
        jellyfin,
        review_clients,
        settings.clone(),
        utils::assets::poster_cache_dir(),
        utils::assets::processed_output_dir(),
    )
    .context("failed to prepare poster processor")?;

    let (queue, queue_rx) = job_queue();
    for job in BatchJob::list_queued(&db.pool).await? {
        queue.enqueue(job.id);
    }

    let dispatcher = Dispatcher::new(
        db.pool.clone(),
        processor,
        tracker.clone(),
        settings.clone(),
        queue_rx,
    );
    tokio::spawn(dispatcher.run());

    let state = AppState {
        db,
        settings,
        tracker,
        queue,
    };

    let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port = std::env::var("PORT")
        .ok()
        .and_then(|p| p.parse::<u16>().ok())
        .unwrap_or(3000);
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("failed to bind {host}:{port}"))?;
    tracing::info!("aphrodite batch core listening on {host}:{port}");

    axum::serve(listener, router(state)).await?;
    Ok(())
}
