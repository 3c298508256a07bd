//! Error types for the query proxy.
//!
//! Every failure on the forwarding path ends up as a [`ProxyError`]. Whether it reaches the
//! caller as a structured body or only as a log line is decided by the inbound handler from the
//! number of bytes already streamed, never by the variant alone.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Machine-readable error code carried in structured error bodies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    #[serde(rename = "invalid")]
    Invalid,
    #[serde(rename = "unauthorized")]
    Unauthorized,
    #[serde(rename = "forbidden")]
    Forbidden,
    #[serde(rename = "not found")]
    NotFound,
    #[serde(rename = "request too large")]
    RequestTooLarge,
    #[serde(rename = "unprocessable entity")]
    Unprocessable,
    #[serde(rename = "too many requests")]
    TooManyRequests,
    #[serde(rename = "internal error")]
    Internal,
    #[serde(rename = "not implemented")]
    NotImplemented,
    #[serde(rename = "bad gateway")]
    BadGateway,
    #[serde(rename = "unavailable")]
    Unavailable,
    #[serde(rename = "gateway timeout")]
    GatewayTimeout,
}

impl ErrorCode {
    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::Invalid => "invalid",
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::Forbidden => "forbidden",
            ErrorCode::NotFound => "not found",
            ErrorCode::RequestTooLarge => "request too large",
            ErrorCode::Unprocessable => "unprocessable entity",
            ErrorCode::TooManyRequests => "too many requests",
            ErrorCode::Internal => "internal error",
            ErrorCode::NotImplemented => "not implemented",
            ErrorCode::BadGateway => "bad gateway",
            ErrorCode::Unavailable => "unavailable",
            ErrorCode::GatewayTimeout => "gateway timeout",
        }
    }

    /// Parse a wire code. Unknown codes yield `None`.
    pub fn from_wire(code: &str) -> Option<Self> {
        let code = match code {
            "invalid" => ErrorCode::Invalid,
            "unauthorized" => ErrorCode::Unauthorized,
            "forbidden" => ErrorCode::Forbidden,
            "not found" => ErrorCode::NotFound,
            "request too large" => ErrorCode::RequestTooLarge,
            "unprocessable entity" => ErrorCode::Unprocessable,
            "too many requests" => ErrorCode::TooManyRequests,
            "internal error" => ErrorCode::Internal,
            "not implemented" => ErrorCode::NotImplemented,
            "bad gateway" => ErrorCode::BadGateway,
            "unavailable" => ErrorCode::Unavailable,
            "gateway timeout" => ErrorCode::GatewayTimeout,
            _ => return None,
        };
        Some(code)
    }

    /// Best-effort code for a bare HTTP status.
    pub fn from_status(status: StatusCode) -> Self {
        match status {
            StatusCode::BAD_REQUEST => ErrorCode::Invalid,
            StatusCode::UNAUTHORIZED => ErrorCode::Unauthorized,
            StatusCode::FORBIDDEN => ErrorCode::Forbidden,
            StatusCode::NOT_FOUND => ErrorCode::NotFound,
            StatusCode::PAYLOAD_TOO_LARGE => ErrorCode::RequestTooLarge,
            StatusCode::UNPROCESSABLE_ENTITY => ErrorCode::Unprocessable,
            StatusCode::TOO_MANY_REQUESTS => ErrorCode::TooManyRequests,
            StatusCode::NOT_IMPLEMENTED => ErrorCode::NotImplemented,
            StatusCode::BAD_GATEWAY => ErrorCode::BadGateway,
            StatusCode::SERVICE_UNAVAILABLE => ErrorCode::Unavailable,
            StatusCode::GATEWAY_TIMEOUT => ErrorCode::GatewayTimeout,
            s if s.is_client_error() => ErrorCode::Invalid,
            _ => ErrorCode::Internal,
        }
    }

    /// HTTP status the code is reported with.
    pub fn status(&self) -> StatusCode {
        match self {
            ErrorCode::Invalid => StatusCode::BAD_REQUEST,
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::Forbidden => StatusCode::FORBIDDEN,
            ErrorCode::NotFound => StatusCode::NOT_FOUND,
            ErrorCode::RequestTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorCode::Unprocessable => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorCode::TooManyRequests => StatusCode::TOO_MANY_REQUESTS,
            ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
            ErrorCode::NotImplemented => StatusCode::NOT_IMPLEMENTED,
            ErrorCode::BadGateway => StatusCode::BAD_GATEWAY,
            ErrorCode::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::GatewayTimeout => StatusCode::GATEWAY_TIMEOUT,
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which registry a type tag is resolved against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VariantKind {
    Compiler,
    Dialect,
}

impl std::fmt::Display for VariantKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VariantKind::Compiler => f.write_str("compiler"),
            VariantKind::Dialect => f.write_str("dialect"),
        }
    }
}

/// Failures while turning an inbound body into a `ProxyRequest`.
#[derive(Debug, Error)]
pub enum DecodeError {
    /// The body could not be read or exceeded the size limit.
    #[error("failed to read request body: {0}")]
    Body(String),

    /// The envelope is not valid JSON or misses required fields.
    #[error("malformed request: {0}")]
    Malformed(#[from] serde_json::Error),

    /// The type tag is not present in the registered mapping.
    #[error("unsupported {kind} type {tag:?}")]
    UnsupportedVariant { kind: VariantKind, tag: String },

    /// The tag resolved but its payload was rejected.
    #[error("invalid {kind} {tag:?}: {reason}")]
    Invalid {
        kind: VariantKind,
        tag: String,
        reason: String,
    },
}

/// Kind of transport failure seen before any body byte was streamed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportKind {
    Connect,
    Timeout,
    Cancelled,
    Request,
}

impl std::fmt::Display for TransportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportKind::Connect => f.write_str("connect"),
            TransportKind::Timeout => f.write_str("timeout"),
            TransportKind::Cancelled => f.write_str("cancelled"),
            TransportKind::Request => f.write_str("request"),
        }
    }
}

/// Structured error returned by the remote backend.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("remote returned {status}: {code}: {message}")]
pub struct RemoteError {
    pub status: u16,
    pub code: ErrorCode,
    pub message: String,
}

/// Errors that can occur while proxying a query.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error("unsupported dialect over HTTP: {0}")]
    UnsupportedDialect(String),

    #[error("{kind} error: {message}")]
    Transport {
        kind: TransportKind,
        message: String,
    },

    #[error(transparent)]
    Remote(#[from] RemoteError),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProxyError {
    pub fn transport(kind: TransportKind, message: impl Into<String>) -> Self {
        ProxyError::Transport {
            kind,
            message: message.into(),
        }
    }

    /// Code reported to the caller when the error is still representable.
    pub fn code(&self) -> ErrorCode {
        match self {
            ProxyError::Decode(_) | ProxyError::UnsupportedDialect(_) => ErrorCode::Invalid,
            ProxyError::Transport { kind, .. } => match kind {
                TransportKind::Timeout => ErrorCode::GatewayTimeout,
                TransportKind::Cancelled => ErrorCode::Unavailable,
                TransportKind::Connect | TransportKind::Request => ErrorCode::BadGateway,
            },
            ProxyError::Remote(remote) => remote.code,
            ProxyError::Stream(_) => ErrorCode::BadGateway,
            ProxyError::Internal(_) => ErrorCode::Internal,
        }
    }
}

/// Result type alias for proxy operations.
pub type ProxyResult<T> = Result<T, ProxyError>;
