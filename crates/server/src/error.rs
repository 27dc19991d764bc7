use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use db::models::batch_job::BatchJobError;
use db::models::poster_status::PosterStatusError;
use thiserror::Error;
use utils::response::ApiResponse;
use workers::job_creator::SubmissionError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Submission(#[from] SubmissionError),
    #[error(transparent)]
    Job(#[from] BatchJobError),
    #[error(transparent)]
    PosterStatus(#[from] PosterStatusError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("Not Found: {0}")]
    NotFound(String),
    #[error("Bad Request: {0}")]
    BadRequest(String),
    #[error("Internal Server Error: {0}")]
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = match &self {
            ApiError::Submission(err) if err.is_validation() => StatusCode::BAD_REQUEST,
            ApiError::Submission(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Job(BatchJobError::NotFound(_)) => StatusCode::NOT_FOUND,
            ApiError::Job(BatchJobError::InvalidTransition(_)) => StatusCode::CONFLICT,
            ApiError::Job(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::PosterStatus(PosterStatusError::NotFound { .. }) => StatusCode::NOT_FOUND,
            ApiError::PosterStatus(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let response = ApiResponse::<()>::error(&self.to_string());
        (status_code, Json(response)).into_response()
    }
}
