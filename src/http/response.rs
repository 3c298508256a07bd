//! Structured error responses.
//!
//! # Responsibilities
//! - Encode a `ProxyError` as `{"code", "message"}` with a matching status
//! - Decode the remote backend's error responses into `RemoteError`
//!
//! # Design Decisions
//! - Only used while no body byte has been sent; afterwards errors are logged, not encoded
//! - Remote errors keep the remote's code and message so the caller sees what the backend said

use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorCode, ProxyError, RemoteError};

pub const PLATFORM_ERROR_CODE: &str = "x-platform-error-code";

/// Wire form of a structured error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: ErrorCode,
    pub message: String,
}

impl From<&ProxyError> for ErrorBody {
    fn from(err: &ProxyError) -> Self {
        let message = match err {
            ProxyError::Remote(remote) => remote.message.clone(),
            other => other.to_string(),
        };
        Self {
            code: err.code(),
            message,
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = ErrorBody::from(&self);
        (
            body.code.status(),
            [(
                HeaderName::from_static(PLATFORM_ERROR_CODE),
                HeaderValue::from_static(body.code.as_str()),
            )],
            Json(body),
        )
            .into_response()
    }
}

/// Lenient view of a remote error body; unknown codes fall back to the status.
#[derive(Debug, Default, Deserialize)]
struct RemoteErrorBody {
    code: Option<String>,
    message: Option<String>,
}

/// Build a `RemoteError` from a non-success response.
pub fn remote_error(status: StatusCode, header_code: Option<&str>, body: &[u8]) -> RemoteError {
    let parsed = serde_json::from_slice::<RemoteErrorBody>(body).ok();

    let code = parsed
        .as_ref()
        .and_then(|b| b.code.as_deref())
        .or(header_code)
        .and_then(ErrorCode::from_wire)
        .unwrap_or_else(|| ErrorCode::from_status(status));

    let message = match parsed.and_then(|b| b.message) {
        Some(message) => message,
        None => {
            let text = String::from_utf8_lossy(body).trim().to_string();
            if text.is_empty() {
                status
                    .canonical_reason()
                    .unwrap_or("unknown error")
                    .to_string()
            } else {
                text
            }
        }
    };

    RemoteError {
        status: status.as_u16(),
        code,
        message,
    }
}
