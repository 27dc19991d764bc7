use std::sync::Arc;

use axum::Router;
use db::DBService;
use services::services::config::AppSettings;
use services::services::progress::ProgressTracker;
use tower_http::cors::CorsLayer;
use workers::dispatcher::JobQueue;

pub mod error;
pub mod routes;

#[derive(Clone)]
pub struct AppState {
    pub db: DBService,
    pub settings: Arc<AppSettings>,
    pub tracker: ProgressTracker,
    pub queue: JobQueue,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(routes::jobs::router())
        .merge(routes::progress::router())
        .merge(routes::system::router())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
