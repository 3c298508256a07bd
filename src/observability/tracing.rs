//! Distributed tracing support.
//!
//! # Responsibilities
//! - Extract W3C trace context (`traceparent`) from incoming requests
//! - Propagate a child context to the remote backend
//!
//! # Design Decisions
//! - Missing or malformed `traceparent` starts a new trace rather than failing the request
//! - Trace ids are UUID v4 in simple form (32 lowercase hex), span ids come from `fastrand`

use axum::http::{HeaderMap, HeaderValue};
use uuid::Uuid;

pub const TRACEPARENT: &str = "traceparent";

const VERSION: &str = "00";
const FLAG_SAMPLED: u8 = 0x01;

/// W3C trace context for one hop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TraceContext {
    trace_id: String,
    span_id: String,
    flags: u8,
}

impl TraceContext {
    /// Start a new sampled trace.
    pub fn new_root() -> Self {
        Self {
            trace_id: Uuid::new_v4().simple().to_string(),
            span_id: new_span_id(),
            flags: FLAG_SAMPLED,
        }
    }

    /// Extract the caller's context, or start a new trace.
    pub fn from_headers(headers: &HeaderMap) -> Self {
        headers
            .get(TRACEPARENT)
            .and_then(|v| v.to_str().ok())
            .and_then(Self::parse)
            .unwrap_or_else(Self::new_root)
    }

    /// Parse a `traceparent` value: `{version}-{trace_id}-{span_id}-{flags}`.
    pub fn parse(value: &str) -> Option<Self> {
        let mut parts = value.trim().split('-');
        let version = parts.next()?;
        let trace_id = parts.next()?;
        let span_id = parts.next()?;
        let flags = parts.next()?;
        if parts.next().is_some() || version != VERSION {
            return None;
        }
        if !is_lower_hex(trace_id, 32) || !is_lower_hex(span_id, 16) || !is_lower_hex(flags, 2) {
            return None;
        }
        // All-zero ids are invalid per W3C.
        if trace_id.bytes().all(|b| b == b'0') || span_id.bytes().all(|b| b == b'0') {
            return None;
        }
        Some(Self {
            trace_id: trace_id.to_string(),
            span_id: span_id.to_string(),
            flags: u8::from_str_radix(flags, 16).ok()?,
        })
    }

    /// Context for an outbound call made on behalf of this one.
    pub fn child(&self) -> Self {
        Self {
            trace_id: self.trace_id.clone(),
            span_id: new_span_id(),
            flags: self.flags,
        }
    }

    pub fn trace_id(&self) -> &str {
        &self.trace_id
    }

    pub fn span_id(&self) -> &str {
        &self.span_id
    }

    pub fn is_sampled(&self) -> bool {
        self.flags & FLAG_SAMPLED != 0
    }

    pub fn to_traceparent(&self) -> String {
        format!("{}-{}-{}-{:02x}", VERSION, self.trace_id, self.span_id, self.flags)
    }

    /// Write `traceparent` into outbound headers.
    pub fn inject(&self, headers: &mut HeaderMap) {
        if let Ok(value) = HeaderValue::from_str(&self.to_traceparent()) {
            headers.insert(TRACEPARENT, value);
        }
    }
}

fn new_span_id() -> String {
    // Zero is reserved.
    let id = loop {
        let id = fastrand::u64(..);
        if id != 0 {
            break id;
        }
    };
    format!("{:016x}", id)
}

fn is_lower_hex(s: &str, len: usize) -> bool {
    s.len() == len && s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PARENT: &str = "00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01";

    #[test]
    fn test_parse_valid_traceparent() {
        let ctx = TraceContext::parse(PARENT).unwrap();
        assert_eq!(ctx.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(ctx.span_id(), "00f067aa0ba902b7");
        assert!(ctx.is_sampled());
        assert_eq!(ctx.to_traceparent(), PARENT);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(TraceContext::parse("").is_none());
        assert!(TraceContext::parse("01-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::parse("00-4BF92F3577B34DA6A3CE929D0E0E4736-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::parse("00-00000000000000000000000000000000-00f067aa0ba902b7-01").is_none());
        assert!(TraceContext::parse("00-4bf92f3577b34da6a3ce929d0e0e4736-00f067aa0ba902b7-01-xx").is_none());
    }

    #[test]
    fn test_child_keeps_trace_id() {
        let parent = TraceContext::parse(PARENT).unwrap();
        let child = parent.child();
        assert_eq!(child.trace_id(), parent.trace_id());
        assert_ne!(child.span_id(), parent.span_id());
        assert_eq!(child.span_id().len(), 16);
    }

    #[test]
    fn test_from_headers_and_inject() {
        let mut headers = HeaderMap::new();
        headers.insert(TRACEPARENT, HeaderValue::from_static(PARENT));
        let ctx = TraceContext::from_headers(&headers);
        assert_eq!(ctx.trace_id(), "4bf92f3577b34da6a3ce929d0e0e4736");

        let mut outbound = HeaderMap::new();
        ctx.child().inject(&mut outbound);
        let injected = outbound[TRACEPARENT].to_str().unwrap();
        assert!(injected.starts_with("00-4bf92f3577b34da6a3ce929d0e0e4736-"));

        let fresh = TraceContext::from_headers(&HeaderMap::new());
        assert_eq!(fresh.trace_id().len(), 32);
    }
}
