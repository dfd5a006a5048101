//! API request, response and error types.

use axum::Json;
use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::{Deserialize, Serialize};

/// Body of `GET /imitator/mode` and `PUT /imitator/mode`. `true` is auto.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModeBody {
    pub mode: bool,
}

/// Success body of every mutating endpoint.
#[derive(Debug, Serialize)]
pub struct StatusBody {
    pub status: &'static str,
}

impl StatusBody {
    pub const OK: Self = Self { status: "OK" };
}

/// Error response body.
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable error message.
    pub error: String,
}

/// Handler failure, rendered as a status code plus [`ErrorResponse`].
#[derive(Debug)]
pub enum ApiError {
    /// Malformed path or body (400).
    BadRequest(String),
    /// Operator edit attempted while the imitator is in auto mode (409).
    Conflict(String),
    /// Well-formed request naming a target that does not exist (422).
    Unprocessable(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let error = match self {
            ApiError::BadRequest(msg)
            | ApiError::Conflict(msg)
            | ApiError::Unprocessable(msg) => msg,
        };
        (status, Json(ErrorResponse { error })).into_response()
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::BadRequest(rejection.body_text())
    }
}
