//! Per-request context.
//!
//! # Responsibilities
//! - Carry the request ID assigned by the request-id layer
//! - Carry the caller's trace context
//! - Carry the cancellation token tied to the inbound request's lifetime
//!
//! # Design Decisions
//! - Request ID added as early as possible for tracing
//! - Cancellation fires from a drop guard, so every exit path of the inbound request aborts the
//!   outbound call

use axum::http::HeaderMap;
use tokio_util::sync::{CancellationToken, DropGuard};
use uuid::Uuid;

use crate::observability::tracing::TraceContext;

pub const X_REQUEST_ID: &str = "x-request-id";

/// Everything the forward path needs to know about the inbound request besides its body.
#[derive(Debug, Clone)]
pub struct RequestContext {
    request_id: String,
    trace: TraceContext,
    cancel: CancellationToken,
}

impl RequestContext {
    pub fn new(request_id: impl Into<String>, trace: TraceContext) -> Self {
        Self {
            request_id: request_id.into(),
            trace,
            cancel: CancellationToken::new(),
        }
    }

    /// Build from inbound headers, generating whatever is missing.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let request_id = headers
            .get(X_REQUEST_ID)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self::new(request_id, TraceContext::from_headers(headers))
    }

    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    pub fn trace(&self) -> &TraceContext {
        &self.trace
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Guard that cancels this request when dropped.
    pub fn cancel_on_drop(&self) -> DropGuard {
        self.cancel.clone().drop_guard()
    }
}
