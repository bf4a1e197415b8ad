use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

#[derive(Debug, thiserror::Error)]
pub enum BenchError {
    #[error("Unknown duration class: {0}")]
    InvalidDuration(String),

    #[error("Job not found: {0}")]
    JobNotFound(String),

    #[error("Select between 2 and 5 benchmarks to compare (got {0})")]
    InvalidSelectionCount(usize),

    #[error("At least 2 completed benchmarks are required for comparison ({0} resolved)")]
    InsufficientCompletedResults(usize),

    #[error("Unknown comparison metric: {0}")]
    UnknownMetric(String),

    #[error("Work unit failed: {0}")]
    WorkUnitFailure(String),

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Job config error: {0}")]
    Config(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(String),
}

impl IntoResponse for BenchError {
    fn into_response(self) -> Response {
        let status = match &self {
            BenchError::InvalidDuration(_)
            | BenchError::InvalidSelectionCount(_)
            | BenchError::InsufficientCompletedResults(_)
            | BenchError::UnknownMetric(_) => StatusCode::BAD_REQUEST,
            BenchError::JobNotFound(_) => StatusCode::NOT_FOUND,
            BenchError::WorkUnitFailure(_)
            | BenchError::Storage(_)
            | BenchError::Config(_)
            | BenchError::Io(_)
            | BenchError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        let body = serde_json::json!({
            "error": self.to_string(),
        });

        (status, axum::Json(body)).into_response()
    }
}
