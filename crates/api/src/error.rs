//! API error types with HTTP response mapping.

use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use domain::{DomainError, ErrorKind};
use serde::Serialize;
use thiserror::Error;

/// API-level error type that maps to HTTP responses.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Error raised by a business operation.
    #[error(transparent)]
    Domain(#[from] DomainError),

    /// The request could not be decoded.
    #[error("Invalid request: {message}")]
    BadRequest {
        field: Option<String>,
        message: String,
    },
}

/// JSON error body: `{ "code", "message", "field"? }`.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
}

impl ApiError {
    pub fn bad_request(field: impl Into<String>, message: impl Into<String>) -> Self {
        ApiError::BadRequest {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            ApiError::Domain(err) => err.kind(),
            ApiError::BadRequest { .. } => ErrorKind::BadRequest,
        }
    }

    fn field(&self) -> Option<String> {
        match self {
            ApiError::Domain(err) => err.field().map(str::to_string),
            ApiError::BadRequest { field, .. } => field.clone(),
        }
    }
}

/// HTTP status for each error kind.
pub fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Unauthorized => StatusCode::UNAUTHORIZED,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::VersionMismatch => StatusCode::CONFLICT,
        ErrorKind::QuantityNegative | ErrorKind::QuantityExceeded => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ErrorKind::DuplicateOrderItems | ErrorKind::BadRequest => StatusCode::BAD_REQUEST,
        ErrorKind::DbDown => StatusCode::SERVICE_UNAVAILABLE,
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        let status = status_for(kind);
        metrics::counter!("api_errors_total", "code" => kind.code()).increment(1);

        if kind == ErrorKind::DbDown {
            tracing::error!(error = %self, "storage unavailable");
        }

        let body = ErrorBody {
            code: kind.code(),
            message: self.to_string(),
            field: self.field(),
        };
        (status, axum::Json(body)).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::BadRequest {
            field: None,
            message: rejection.body_text(),
        }
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest {
            field: None,
            message: rejection.body_text(),
        }
    }
}
