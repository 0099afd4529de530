use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use pixel_types::api::ErrorResponse;

/// Why a request could not be tied to a user. Only ever logged; clients see
/// a single generic 401.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    MissingArtifact,
    InvalidToken,
    SessionNotFound,
    SessionExpired,
    UnknownUser,
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingArtifact => write!(f, "no session cookie or bearer token"),
            Self::InvalidToken => write!(f, "malformed or badly signed token"),
            Self::SessionNotFound => write!(f, "session not found"),
            Self::SessionExpired => write!(f, "session idle timeout exceeded"),
            Self::UnknownUser => write!(f, "session user no longer exists"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("username already exists")]
    DuplicateUsername,

    #[error("invalid credentials")]
    InvalidCredentials,

    #[error("unauthenticated: {0}")]
    Unauthenticated(Rejection),

    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("bad request: {0}")]
    BadRequest(&'static str),

    #[error("store unavailable: {0:#}")]
    StoreUnavailable(#[from] anyhow::Error),

    #[error("internal error: {0:#}")]
    Internal(anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated(_) => StatusCode::UNAUTHORIZED,
            Self::Forbidden => StatusCode::FORBIDDEN,
            Self::NotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::StoreUnavailable(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn public_message(&self) -> String {
        match self {
            Self::DuplicateUsername => "username already exists".into(),
            Self::InvalidCredentials => "invalid username or password".into(),
            Self::Unauthenticated(_) => "unauthorized".into(),
            Self::Forbidden => "forbidden: you are not the owner of this post".into(),
            Self::NotFound => "not found".into(),
            Self::BadRequest(msg) => (*msg).into(),
            Self::StoreUnavailable(_) | Self::Internal(_) => "internal server error".into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if matches!(self, Self::StoreUnavailable(_) | Self::Internal(_)) {
            error!("Request failed: {}", self);
        }
        let body = ErrorResponse {
            error: self.public_message(),
        };
        (self.status(), Json(body)).into_response()
    }
}

/// Runs blocking store or hashing work off the async runtime.
pub async fn run_blocking<F, T>(f: F) -> Result<T, ApiError>
where
    F: FnOnce() -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f).await.map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Internal(anyhow::anyhow!("blocking task failed: {}", e))
    })?
}
