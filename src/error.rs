//! Bridge error types.
//!
//! Device-facing failures ([`LocateError`], [`TransportError`]) never leave
//! the connection supervisor; they are converted into client status
//! messages. [`DecodeError`] covers malformed client frames. [`BridgeError`]
//! is the HTTP-facing error with a structured JSON body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// Structured JSON error response body.
///
/// All error responses follow this shape:
/// ```json
/// {
///   "error": {
///     "code": 2001,
///     "message": "device not connected",
///     "details": null
///   }
/// }
/// ```
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorResponse {
    /// Structured error payload.
    pub error: ErrorBody,
}

/// Inner error body with numeric code and human-readable message.
#[derive(Debug, Serialize, utoipa::ToSchema)]
pub struct ErrorBody {
    /// Numeric error code.
    pub code: u32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
}

/// Failure to find and open the controller.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LocateError {
    /// Every candidate port was tried and none could be opened.
    #[error("device not found (tried {tried} candidate ports)")]
    DeviceNotFound {
        /// Number of open attempts made.
        tried: usize,
    },

    /// The operating system refused to enumerate serial ports.
    #[error("failed to enumerate serial ports: {0}")]
    Enumerate(String),
}

/// I/O fault on an open device handle.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Underlying read, write or flush failed.
    #[error("serial i/o error: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream (device unplugged).
    #[error("serial stream closed by device")]
    Closed,

    /// The handle was already closed when the operation was attempted.
    #[error("serial handle is not open")]
    NotOpen,
}

/// A client frame that could not be turned into a command.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    /// The frame was not a JSON object with a string `action` field.
    #[error("malformed client message: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The `action` field named something the bridge does not support.
    #[error("unknown action: {0}")]
    UnknownAction(String),
}

/// HTTP-facing error enum with status code mapping.
///
/// # Error Code Ranges
///
/// | Range     | Category  | HTTP Status               |
/// |-----------|-----------|---------------------------|
/// | 2000–2999 | Device    | 503 Service Unavailable   |
/// | 3000–3999 | Server    | 500 Internal Server Error |
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// Controller could not be located.
    #[error(transparent)]
    Locate(#[from] LocateError),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Returns the numeric error code for this variant.
    #[must_use]
    pub const fn error_code(&self) -> u32 {
        match self {
            Self::Locate(LocateError::DeviceNotFound { .. }) => 2001,
            Self::Locate(LocateError::Enumerate(_)) => 2002,
            Self::Internal(_) => 3000,
        }
    }

    /// Returns the HTTP status code for this variant.
    #[must_use]
    pub const fn status_code(&self) -> StatusCode {
        match self {
            Self::Locate(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for BridgeError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = ErrorResponse {
            error: ErrorBody {
                code: self.error_code(),
                message: self.to_string(),
                details: None,
            },
        };
        let mut response = axum::Json(body).into_response();
        *response.status_mut() = status;
        response
    }
}
