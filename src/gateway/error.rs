//! Gateway error responses.
//!
//! Upstream gRPC statuses are translated into HTTP responses with the same
//! class of status code and a JSON body:
//!
//! ```json
//! {"error": "note not found", "code": 5, "message": "note not found", "details": []}
//! ```

use axum::Json;
use axum::response::{IntoResponse, Response};
use http::StatusCode;
use metrics::counter;
use serde::Serialize;
use tonic::Code;
use tracing::debug;

use crate::telemetry;

/// Error returned by a gateway handler.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The upstream RPC answered with a non-OK status.
    #[error("{}", .0.message())]
    Status(#[from] tonic::Status),

    /// The request body is not valid JSON for the target message.
    #[error("invalid request body: {0}")]
    Body(#[from] serde_json::Error),
}

impl GatewayError {
    /// gRPC code carried by the error.
    pub fn code(&self) -> Code {
        match self {
            GatewayError::Status(status) => status.code(),
            GatewayError::Body(_) => Code::InvalidArgument,
        }
    }
}

/// JSON error body.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
    pub code: i32,
    pub message: String,
    pub details: Vec<serde_json::Value>,
}

/// HTTP status for a gRPC code.
pub fn http_status(code: Code) -> StatusCode {
    match code {
        Code::Ok => StatusCode::OK,
        Code::Cancelled => StatusCode::REQUEST_TIMEOUT,
        Code::Unknown => StatusCode::INTERNAL_SERVER_ERROR,
        Code::InvalidArgument => StatusCode::BAD_REQUEST,
        Code::DeadlineExceeded => StatusCode::GATEWAY_TIMEOUT,
        Code::NotFound => StatusCode::NOT_FOUND,
        Code::AlreadyExists => StatusCode::CONFLICT,
        Code::PermissionDenied => StatusCode::FORBIDDEN,
        Code::Unauthenticated => StatusCode::UNAUTHORIZED,
        Code::ResourceExhausted => StatusCode::TOO_MANY_REQUESTS,
        Code::FailedPrecondition => StatusCode::BAD_REQUEST,
        Code::Aborted => StatusCode::CONFLICT,
        Code::OutOfRange => StatusCode::BAD_REQUEST,
        Code::Unimplemented => StatusCode::NOT_IMPLEMENTED,
        Code::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        Code::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        Code::DataLoss => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let code = self.code();
        if let GatewayError::Status(status) = &self {
            debug!(code = ?code, message = status.message(), "upstream call failed");
            counter!(telemetry::GATEWAY_UPSTREAM_ERRORS_TOTAL, "code" => format!("{code:?}"))
                .increment(1);
        }

        let message = self.to_string();
        let body = ErrorBody {
            error: message.clone(),
            code: code as i32,
            message,
            details: Vec::new(),
        };
        (http_status(code), Json(body)).into_response()
    }
}
