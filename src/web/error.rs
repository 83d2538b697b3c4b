use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use log::error;
use serde_json::json;
use thiserror::Error;

use crate::storage::StorageError;

#[derive(Error, Debug)]
pub enum WebError {
    #[error("{0}")]
    NotFound(String),

    #[error("Login required")]
    Unauthorized,

    #[error("{0}")]
    Forbidden(String),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Conflict(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

pub type WebResult<T> = Result<T, WebError>;

impl From<StorageError> for WebError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound(what) => WebError::NotFound(format!("{} not found", what)),
            StorageError::AlreadyExists(what) => WebError::Conflict(format!("{} already exists", what)),
            StorageError::Invalid(msg) => WebError::BadRequest(msg),
            StorageError::PermissionDenied(msg) => WebError::Forbidden(msg),
            other => WebError::Internal(other.to_string()),
        }
    }
}

impl From<tower_sessions::session::Error> for WebError {
    fn from(e: tower_sessions::session::Error) -> Self {
        WebError::Internal(format!("session: {}", e))
    }
}

impl From<axum::extract::multipart::MultipartError> for WebError {
    fn from(e: axum::extract::multipart::MultipartError) -> Self {
        WebError::BadRequest(format!("Malformed upload: {}", e))
    }
}

impl IntoResponse for WebError {
    fn into_response(self) -> Response {
        let status = match self {
            WebError::NotFound(_) => StatusCode::NOT_FOUND,
            WebError::Unauthorized => StatusCode::UNAUTHORIZED,
            WebError::Forbidden(_) => StatusCode::FORBIDDEN,
            WebError::BadRequest(_) => StatusCode::BAD_REQUEST,
            WebError::Conflict(_) => StatusCode::CONFLICT,
            WebError::Internal(ref msg) => {
                error!("Request failed: {}", msg);
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        // Internal details stay in the log
        let message = match self {
            WebError::Internal(_) => "Internal server error".to_string(),
            other => other.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn storage_errors_map_to_status_codes() {
        let cases = [
            (StorageError::NotFound("Thread 'x'".into()), StatusCode::NOT_FOUND),
            (StorageError::AlreadyExists("Category 'y'".into()), StatusCode::CONFLICT),
            (StorageError::Invalid("bad".into()), StatusCode::BAD_REQUEST),
            (StorageError::PermissionDenied("no".into()), StatusCode::FORBIDDEN),
            (StorageError::PasswordHash("boom".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(WebError::from(err).into_response().status(), status);
        }
        assert_eq!(WebError::Unauthorized.into_response().status(), StatusCode::UNAUTHORIZED);
    }
}
