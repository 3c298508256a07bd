//! The seam between the inbound handler and whatever executes the query.

use async_trait::async_trait;

use crate::error::ProxyError;
use crate::http::request::RequestContext;
use crate::http::sink::ResponseSink;
use crate::query::ProxyRequest;

/// Result of one forward attempt: how many bytes reached the sink, and what went wrong.
///
/// `bytes_written` is honest even on failure; it is the only signal used to decide whether an
/// error can still be reported as a structured response.
#[derive(Debug)]
pub struct ForwardOutcome {
    pub bytes_written: u64,
    pub error: Option<ProxyError>,
}

impl ForwardOutcome {
    pub fn completed(bytes_written: u64) -> Self {
        Self {
            bytes_written,
            error: None,
        }
    }

    pub fn failed(bytes_written: u64, error: ProxyError) -> Self {
        Self {
            bytes_written,
            error: Some(error),
        }
    }
}

/// Executes a proxied query, streaming the encoded result into `sink`.
#[async_trait]
pub trait ProxyQueryService: Send + Sync {
    async fn query(
        &self,
        ctx: &RequestContext,
        sink: &mut dyn ResponseSink,
        request: &ProxyRequest,
    ) -> ForwardOutcome;
}
