use axum::{
    Json,
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

use crate::{session::SessionError, view::RenderError};

/// RepositoryError
///
/// Outcome of a failed call into the persistence collaborator.
#[derive(Error, Debug)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A uniqueness constraint rejected the write.
    #[error("conflict: {0}")]
    Conflict(String),

    /// A write referenced a parent row that is missing, or a delete would orphan children.
    #[error("foreign key violation: {0}")]
    ForeignKey(String),

    #[error("store unavailable: {0}")]
    Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepositoryError>;

/// AppError
///
/// The service-wide error taxonomy. Every variant maps to exactly one HTTP status; the
/// body never carries internal error text for persistence or rendering failures.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("login or password entered incorrectly")]
    InvalidCredentials,

    #[error("authentication required")]
    Unauthenticated,

    #[error("forbidden")]
    Forbidden,

    #[error("invalid reference: {0}")]
    InvalidReference(String),

    #[error("question {question_id} already answered by this identity")]
    DuplicateVote { question_id: i64 },

    #[error("voting is not open")]
    VotingClosed,

    #[error("request deadline exceeded")]
    Timeout,

    #[error(transparent)]
    Persistence(#[from] RepositoryError),

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error("render error: {0}")]
    Render(#[from] RenderError),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) | AppError::InvalidReference(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidCredentials | AppError::Unauthenticated => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::DuplicateVote { .. } | AppError::VotingClosed => StatusCode::CONFLICT,
            AppError::Timeout => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Persistence(_) | AppError::Session(_) | AppError::Render(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();

        let message = match &self {
            AppError::Persistence(e) => {
                tracing::error!(error = %e, "persistence failure");
                "internal server error".to_string()
            }
            AppError::Session(e) => {
                tracing::error!(error = %e, "session store failure");
                "internal server error".to_string()
            }
            AppError::Render(e) => {
                tracing::error!(error = %e, "render failure");
                "internal server error".to_string()
            }
            other => {
                tracing::info!(status = status.as_u16(), error = %other, "request rejected");
                other.to_string()
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
