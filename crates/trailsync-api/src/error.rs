use axum::extract::rejection::JsonRejection;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Invalid request: {0}")]
    BadRequest(String),
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error(transparent)]
    Core(#[from] trailsync_core::Error),
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: String,
    pub message: String,
}

impl AppError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            Self::Core(error) => {
                StatusCode::from_u16(error.status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
        }
    }

    pub fn body(&self) -> ErrorBody {
        match self {
            Self::BadRequest(_) => ErrorBody {
                code: "bad-request".to_string(),
                message: self.to_string(),
            },
            Self::Unauthorized(_) => ErrorBody {
                code: "unauthenticated".to_string(),
                message: self.to_string(),
            },
            Self::Core(error) if error.status() >= 500 => ErrorBody {
                code: error.code(),
                message: "Storage is unavailable, try again later".to_string(),
            },
            Self::Core(error) => ErrorBody {
                code: error.code(),
                message: error.to_string(),
            },
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        Self::bad_request(rejection.body_text())
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use trailsync_core::models::{QuotaKind, ResourceKind};
    use trailsync_core::Error;

    use super::*;

    #[test]
    fn core_errors_keep_their_code_and_status() {
        let error = AppError::from(Error::QuotaExceeded(QuotaKind::Trails));
        assert_eq!(error.status(), StatusCode::FORBIDDEN);
        assert_eq!(error.body().code, "quota-exceeded-trails");

        let error = AppError::from(Error::Conflict {
            kind: ResourceKind::Trail,
            id: "abc".to_string(),
        });
        assert_eq!(error.status(), StatusCode::CONFLICT);
        assert_eq!(error.body().code, "conflict");
    }

    #[test]
    fn storage_errors_hide_details() {
        let error = AppError::from(Error::Database("disk I/O error at page 7".to_string()));
        assert_eq!(error.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let body = error.body();
        assert_eq!(body.code, "storage-error");
        assert!(!body.message.contains("page 7"));
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let error = AppError::unauthorized("Missing Authorization header");
        assert_eq!(error.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(error.body().code, "unauthenticated");
    }
}
