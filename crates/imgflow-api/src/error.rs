//! HTTP error response conversion
//!
//! Delivery failures are not HTTP errors: they come back as outcomes in a 200/503 body. This
//! module only covers the operator endpoints, where a missing record or a marker store outage
//! has to be reported as a status code.

use axum::{
    extract::rejection::JsonRejection,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use imgflow_core::{ErrorKind, ErrorMetadata, LogLevel, PipelineError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    /// Machine-readable error code for programmatic handling
    pub code: String,
    /// Whether this error is recoverable (can be retried)
    pub recoverable: bool,
}

#[derive(Debug)]
pub enum HttpAppError {
    NotFound(String),
    Conflict(String),
    InvalidInput(String),
    Pipeline(PipelineError),
}

impl From<PipelineError> for HttpAppError {
    fn from(err: PipelineError) -> Self {
        HttpAppError::Pipeline(err)
    }
}

/// Convert JSON body deserialization failures into a 400 with our ErrorResponse format.
impl From<JsonRejection> for HttpAppError {
    fn from(rejection: JsonRejection) -> Self {
        HttpAppError::InvalidInput(format!("Invalid request body: {}", rejection.body_text()))
    }
}

fn log_error(error: &PipelineError) {
    let code = error.error_code();
    match error.log_level() {
        LogLevel::Debug => tracing::debug!(error = %error, error_code = code, "Error occurred"),
        LogLevel::Warn => tracing::warn!(error = %error, error_code = code, "Error occurred"),
        LogLevel::Error => tracing::error!(error = %error, error_code = code, "Error occurred"),
    }
}

impl IntoResponse for HttpAppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            HttpAppError::NotFound(error) => (
                StatusCode::NOT_FOUND,
                ErrorResponse {
                    error,
                    code: "NOT_FOUND".to_string(),
                    recoverable: false,
                },
            ),
            HttpAppError::Conflict(error) => (
                StatusCode::CONFLICT,
                ErrorResponse {
                    error,
                    code: "CONFLICT".to_string(),
                    recoverable: false,
                },
            ),
            HttpAppError::InvalidInput(error) => (
                StatusCode::BAD_REQUEST,
                ErrorResponse {
                    error,
                    code: "INVALID_INPUT".to_string(),
                    recoverable: false,
                },
            ),
            HttpAppError::Pipeline(err) => {
                log_error(&err);
                let status = match err.kind() {
                    ErrorKind::StoreUnavailable => StatusCode::SERVICE_UNAVAILABLE,
                    _ => StatusCode::INTERNAL_SERVER_ERROR,
                };
                (
                    status,
                    ErrorResponse {
                        error: err.to_string(),
                        code: err.error_code().to_string(),
                        recoverable: err.is_recoverable(),
                    },
                )
            }
        };

        (status, Json(body)).into_response()
    }
}
