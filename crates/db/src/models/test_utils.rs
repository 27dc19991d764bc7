use std::str::FromStr;

use sqlx::{
    SqlitePool,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};

use super::batch_job::{BadgeType, BatchJob, CreateBatchJob, JobPriority, JobSource};

pub(crate) async fn setup_test_pool() -> SqlitePool {
    let options = SqliteConnectOptions::from_str("sqlite::memory:")
        .expect("invalid sqlite config")
        .create_if_missing(true)
        .foreign_keys(true);

    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .expect("failed to open sqlite memory db");

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .expect("failed to run migrations");

    pool
}

pub(crate) async fn create_test_job(
    pool: &SqlitePool,
    poster_ids: &[&str],
    priority: JobPriority,
) -> BatchJob {
    BatchJob::create(
        pool,
        CreateBatchJob {
            user_id: "u1".into(),
            name: "test job".into(),
            source: JobSource::Manual,
            priority,
            badge_types: vec![BadgeType::Audio],
            selected_poster_ids: poster_ids.iter().map(|s| s.to_string()).collect(),
            estimated_completion: None,
        },
    )
    .await
    .expect("failed to create test job")
}
