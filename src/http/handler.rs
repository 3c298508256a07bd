//! Inbound handler for proxied queries.
//!
//! # Request States
//! ```text
//! Received → Decoded → HeadersCommitted → Streaming → Completed
//!                                                   → PartialFailureLogged
//!    (any state before the first body byte)         → ErrorResponseSent
//! ```
//!
//! The dialect's headers are written into the pending response head before the forward call
//! starts. Status and headers go out with the first body chunk; from then on an error can only be
//! logged and the connection cut, since the response cannot be taken back.

use axum::body::Body;
use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use futures_util::stream::{self, Stream, StreamExt};
use std::io;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio_util::sync::DropGuard;
use tracing::Instrument;

use crate::config::LimitsConfig;
use crate::error::{DecodeError, ProxyError};
use crate::http::request::RequestContext;
use crate::http::service::{ForwardOutcome, ProxyQueryService};
use crate::http::sink::{BodyChunk, ChannelSink};
use crate::http::PROXY_QUERY_PATH;
use crate::observability::metrics;
use crate::query::{CompilerMappings, DialectMappings, ProxyRequest};

/// Shared, read-only state of the query route.
#[derive(Clone)]
pub struct QueryHandlerState {
    pub service: Arc<dyn ProxyQueryService>,
    pub compilers: Arc<CompilerMappings>,
    pub dialects: Arc<DialectMappings>,
    pub limits: LimitsConfig,
}

/// Router serving `POST /api/v2/queryproxysvc`.
pub fn routes(state: QueryHandlerState) -> Router {
    Router::new()
        .route(PROXY_QUERY_PATH, post(handle_post_query))
        .with_state(state)
}

/// What the handler does with a forward outcome.
#[derive(Debug)]
pub enum Disposition {
    /// The streamed bytes are the whole response.
    Completed,
    /// Nothing reached the caller; the error becomes a structured response.
    ErrorResponse(ProxyError),
    /// Bytes already reached the caller; the error is logged and the stream cut.
    PartialFailure(ProxyError),
}

impl Disposition {
    pub fn label(&self) -> &'static str {
        match self {
            Disposition::Completed => "completed",
            Disposition::ErrorResponse(_) => "error",
            Disposition::PartialFailure(_) => "partial_failure",
        }
    }
}

/// Classify an outcome by bytes written alone.
pub fn classify(outcome: ForwardOutcome) -> Disposition {
    match outcome.error {
        None => Disposition::Completed,
        Some(err) if outcome.bytes_written == 0 => Disposition::ErrorResponse(err),
        Some(err) => Disposition::PartialFailure(err),
    }
}

async fn handle_post_query(
    State(state): State<QueryHandlerState>,
    headers: HeaderMap,
    body: Body,
) -> Response {
    let ctx = RequestContext::from_headers(&headers);

    if let Some(len) = content_length(&headers) {
        if len > state.limits.max_body_size {
            return error_response(
                &ctx,
                DecodeError::Body(format!(
                    "body of {} bytes exceeds limit of {} bytes",
                    len, state.limits.max_body_size
                ))
                .into(),
            );
        }
    }
    let body = match axum::body::to_bytes(body, state.limits.max_body_size).await {
        Ok(body) => body,
        Err(e) => return error_response(&ctx, DecodeError::Body(e.to_string()).into()),
    };

    let request = match ProxyRequest::decode(&body, &state.compilers, &state.dialects) {
        Ok(request) => request,
        Err(e) => return error_response(&ctx, e.into()),
    };

    let mut head = HeaderMap::new();
    match request.dialect().as_http() {
        Some(dialect) => dialect.set_headers(&mut head),
        None => {
            let tag = request.dialect().dialect_type().to_string();
            return error_response(&ctx, ProxyError::UnsupportedDialect(tag));
        }
    }

    stream_query(state, ctx, request, head).await
}

async fn stream_query(
    state: QueryHandlerState,
    ctx: RequestContext,
    request: ProxyRequest,
    head: HeaderMap,
) -> Response {
    let (sink, mut rx) = ChannelSink::channel(state.limits.stream_buffer);
    // Dropping the handler future or the response body cancels the forward call.
    let cancel_guard = ctx.cancel_on_drop();

    let forward = tokio::spawn(
        forward_task(state.service.clone(), ctx.clone(), request, sink).in_current_span(),
    );

    let first = rx.recv().await;
    match first {
        Some(first) => {
            let mut response = Response::new(Body::from_stream(body_stream(first, rx, cancel_guard)));
            *response.headers_mut() = head;
            response
        }
        // The sink was dropped unused: the outcome is still representable.
        None => match forward.await {
            Ok(Disposition::ErrorResponse(err)) => error_response(&ctx, err),
            Ok(_) => {
                let mut response = StatusCode::OK.into_response();
                *response.headers_mut() = head;
                response
            }
            Err(e) => error_response(&ctx, ProxyError::Internal(format!("forward task failed: {}", e))),
        },
    }
}

/// Run the forward call and settle partial failures, which only this task can still observe.
async fn forward_task(
    service: Arc<dyn ProxyQueryService>,
    ctx: RequestContext,
    request: ProxyRequest,
    mut sink: ChannelSink,
) -> Disposition {
    let started = Instant::now();
    let outcome = service.query(&ctx, &mut sink, &request).await;
    let bytes_written = outcome.bytes_written;
    metrics::record_forward(started.elapsed(), bytes_written);

    let disposition = classify(outcome);
    match &disposition {
        Disposition::Completed => {
            metrics::record_request(disposition.label(), StatusCode::OK.as_u16());
        }
        Disposition::PartialFailure(err) => {
            tracing::warn!(
                request_id = %ctx.request_id(),
                bytes_written,
                error = %err,
                "Error writing response to client"
            );
            metrics::record_partial_failure();
            metrics::record_request(disposition.label(), StatusCode::OK.as_u16());
            sink.abort(io::Error::other(err.to_string())).await;
        }
        Disposition::ErrorResponse(_) => {}
    }
    disposition
}

fn body_stream(
    first: BodyChunk,
    rx: mpsc::Receiver<BodyChunk>,
    cancel_guard: DropGuard,
) -> impl Stream<Item = BodyChunk> + Send + 'static {
    let rest = stream::unfold((rx, cancel_guard), |(mut rx, guard)| async move {
        let chunk = rx.recv().await?;
        if chunk.is_err() {
            // The server aborts on an error item without flushing; hand it the bytes it holds first.
            tokio::task::yield_now().await;
        }
        Some((chunk, (rx, guard)))
    });
    stream::once(async move { first }).chain(rest)
}

fn content_length(headers: &HeaderMap) -> Option<usize> {
    headers
        .get(header::CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .parse()
        .ok()
}

fn error_response(ctx: &RequestContext, err: ProxyError) -> Response {
    tracing::info!(
        request_id = %ctx.request_id(),
        code = %err.code(),
        error = %err,
        "Query failed before streaming"
    );
    let response = err.into_response();
    metrics::record_request("error", response.status().as_u16());
    response
}
