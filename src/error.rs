use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::lock::LockError;
use crate::ports::RepositoryError;
use crate::queue::QueueError;

/// Failure of one pipeline step for one message.
#[derive(Error, Debug)]
pub enum ProcessingError {
    #[error("Transaction not found: {0}")]
    NotFound(String),

    #[error("Unknown gateway: {0}")]
    UnknownGateway(String),

    #[error("Lock error: {0}")]
    Lock(#[from] LockError),

    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Dispatch error: {0}")]
    Dispatch(String),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Malformed message: {0}")]
    Malformed(String),
}

impl From<RepositoryError> for ProcessingError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound(id) => ProcessingError::NotFound(id),
            other => ProcessingError::Repository(other),
        }
    }
}

impl ProcessingError {
    /// Transient errors leave state untouched so a redelivery can make progress.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ProcessingError::Lock(_) | ProcessingError::Repository(_) | ProcessingError::Queue(_)
        )
    }
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Internal server error: {0}")]
    Internal(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<QueueError> for AppError {
    fn from(e: QueueError) -> Self {
        match e {
            QueueError::Backend(msg) => AppError::Unavailable(msg),
            QueueError::Encode(msg) => AppError::Internal(msg),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}
