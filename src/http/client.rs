//! Forwarding client for the remote query backend.
//!
//! # Responsibilities
//! - Serialize the `ProxyRequest` and POST it to the remote's proxy path
//! - Attach the bearer token, trace context and request ID
//! - Stream the remote body into the caller's sink chunk by chunk
//! - Report an honest byte count alongside any failure
//!
//! # Design Decisions
//! - One attempt per request; retry policy belongs to the caller
//! - Anything that fails before the first chunk is copied reports zero bytes
//! - The unverified TLS transport is only built when explicitly configured, and only used for
//!   https endpoints

use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use std::time::Duration;
use tokio::time::timeout;
use tracing::Instrument;
use url::Url;

use crate::config::{TimeoutConfig, UpstreamConfig};
use crate::error::{ProxyError, ProxyResult, TransportKind};
use crate::http::request::{RequestContext, X_REQUEST_ID};
use crate::http::response::{remote_error, PLATFORM_ERROR_CODE};
use crate::http::service::{ForwardOutcome, ProxyQueryService};
use crate::http::sink::ResponseSink;
use crate::http::PROXY_QUERY_PATH;
use crate::query::ProxyRequest;

/// Upper bound on how much of a remote error body is read.
const MAX_ERROR_BODY: usize = 64 * 1024;

/// Client forwarding proxied queries to one remote backend.
pub struct ForwardingClient {
    addr: String,
    token: String,
    insecure_skip_verify: bool,
    verified: reqwest::Client,
    unverified: Option<reqwest::Client>,
    request_timeout: Duration,
    idle_timeout: Duration,
}

impl ForwardingClient {
    pub fn new(upstream: &UpstreamConfig, timeouts: &TimeoutConfig) -> ProxyResult<Self> {
        let connect_timeout = Duration::from_secs(timeouts.connect_secs);

        let verified = build_transport(connect_timeout, false)?;
        let unverified = if upstream.insecure_skip_verify {
            tracing::warn!(
                upstream = %upstream.address,
                "TLS certificate verification disabled for upstream"
            );
            Some(build_transport(connect_timeout, true)?)
        } else {
            None
        };

        Ok(Self {
            addr: upstream.address.clone(),
            token: upstream.token.clone(),
            insecure_skip_verify: upstream.insecure_skip_verify,
            verified,
            unverified,
            request_timeout: Duration::from_secs(timeouts.request_secs),
            idle_timeout: Duration::from_secs(timeouts.idle_secs),
        })
    }

    /// Whether a call to an endpoint with `scheme` skips certificate verification.
    pub fn skips_verification_for(&self, scheme: &str) -> bool {
        self.insecure_skip_verify && scheme == "https"
    }

    fn transport(&self, scheme: &str) -> &reqwest::Client {
        match &self.unverified {
            Some(client) if self.skips_verification_for(scheme) => client,
            _ => &self.verified,
        }
    }

    async fn forward(
        &self,
        ctx: &RequestContext,
        sink: &mut dyn ResponseSink,
        request: &ProxyRequest,
    ) -> ForwardOutcome {
        let url = match endpoint_url(&self.addr, PROXY_QUERY_PATH) {
            Ok(url) => url,
            Err(e) => {
                return fail(
                    0,
                    ProxyError::Internal(format!("invalid upstream address {:?}: {}", self.addr, e)),
                )
            }
        };

        let body = match request.to_wire() {
            Ok(body) => body,
            Err(e) => return fail(0, ProxyError::Internal(format!("failed to encode request: {}", e))),
        };

        let headers = match self.outbound_headers(ctx) {
            Ok(headers) => headers,
            Err(e) => return fail(0, e),
        };

        let call = self
            .transport(url.scheme())
            .post(url)
            .headers(headers)
            .body(body)
            .send();

        let response = tokio::select! {
            biased;
            _ = ctx.cancellation().cancelled() => {
                return fail(0, cancelled("request cancelled before the remote responded"));
            }
            result = timeout(self.request_timeout, call) => match result {
                Ok(Ok(response)) => response,
                Ok(Err(e)) => return fail(0, transport_error(&e)),
                Err(_) => {
                    return fail(0, ProxyError::transport(
                        TransportKind::Timeout,
                        format!("no response from remote within {:?}", self.request_timeout),
                    ));
                }
            },
        };

        let response = match self.check_error(ctx, response).await {
            Ok(response) => response,
            Err(e) => return fail(0, e),
        };

        self.copy_body(ctx, response, sink).await
    }

    fn outbound_headers(&self, ctx: &RequestContext) -> ProxyResult<HeaderMap> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        if !self.token.is_empty() {
            let mut value = HeaderValue::from_str(&format!("Token {}", self.token))
                .map_err(|_| ProxyError::Internal("upstream token is not a valid header value".into()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        if let Ok(value) = HeaderValue::from_str(ctx.request_id()) {
            headers.insert(X_REQUEST_ID, value);
        }
        ctx.trace().child().inject(&mut headers);

        Ok(headers)
    }

    /// Pass success responses through; turn anything else into a `RemoteError`.
    async fn check_error(
        &self,
        ctx: &RequestContext,
        mut response: reqwest::Response,
    ) -> ProxyResult<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let header_code = response
            .headers()
            .get(PLATFORM_ERROR_CODE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while body.len() < MAX_ERROR_BODY {
            let next = tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    return Err(cancelled("request cancelled while reading the remote error"));
                }
                next = timeout(self.idle_timeout, response.chunk()) => next,
            };
            match next {
                Ok(Ok(Some(chunk))) => body.extend_from_slice(&chunk),
                _ => break,
            }
        }
        body.truncate(MAX_ERROR_BODY);

        Err(remote_error(status, header_code.as_deref(), &body).into())
    }

    /// Copy the remote body into the sink. The response is dropped on every return path.
    async fn copy_body(
        &self,
        ctx: &RequestContext,
        mut response: reqwest::Response,
        sink: &mut dyn ResponseSink,
    ) -> ForwardOutcome {
        let mut written: u64 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = ctx.cancellation().cancelled() => {
                    let err = if written == 0 {
                        cancelled("request cancelled before the first byte was streamed")
                    } else {
                        ProxyError::Stream("request cancelled while streaming".into())
                    };
                    return fail(written, err);
                }
                next = timeout(self.idle_timeout, response.chunk()) => next,
            };

            let chunk = match next {
                Ok(Ok(Some(chunk))) => chunk,
                Ok(Ok(None)) => break,
                Ok(Err(e)) => return fail(written, ProxyError::Stream(error_chain(&e))),
                Err(_) => {
                    return fail(
                        written,
                        ProxyError::Stream(format!("remote stalled for {:?}", self.idle_timeout)),
                    )
                }
            };
            if chunk.is_empty() {
                continue;
            }

            let len = chunk.len() as u64;
            if let Err(e) = sink.write_chunk(chunk).await {
                return fail(written, ProxyError::Stream(format!("failed to write to caller: {}", e)));
            }
            written += len;
        }

        tracing::Span::current().record("bytes_written", written);
        ForwardOutcome::completed(written)
    }
}

#[async_trait::async_trait]
impl ProxyQueryService for ForwardingClient {
    async fn query(
        &self,
        ctx: &RequestContext,
        sink: &mut dyn ResponseSink,
        request: &ProxyRequest,
    ) -> ForwardOutcome {
        let span = tracing::info_span!(
            "proxy_query_service.query",
            request_id = %ctx.request_id(),
            trace_id = %ctx.trace().trace_id(),
            upstream = %self.addr,
            bytes_written = tracing::field::Empty,
        );
        self.forward(ctx, sink, request).instrument(span).await
    }
}

/// Replace the path of `addr` with `path`.
pub fn endpoint_url(addr: &str, path: &str) -> Result<Url, url::ParseError> {
    let mut url = Url::parse(addr)?;
    url.set_path(path);
    url.set_query(None);
    Ok(url)
}

fn build_transport(connect_timeout: Duration, skip_verify: bool) -> ProxyResult<reqwest::Client> {
    reqwest::Client::builder()
        .connect_timeout(connect_timeout)
        .danger_accept_invalid_certs(skip_verify)
        .no_proxy()
        .build()
        .map_err(|e| ProxyError::Internal(format!("failed to build upstream transport: {}", e)))
}

fn transport_error(e: &reqwest::Error) -> ProxyError {
    let kind = if e.is_timeout() {
        TransportKind::Timeout
    } else if e.is_connect() {
        TransportKind::Connect
    } else {
        TransportKind::Request
    };
    ProxyError::transport(kind, error_chain(e))
}

fn cancelled(message: &str) -> ProxyError {
    ProxyError::transport(TransportKind::Cancelled, message)
}

fn error_chain(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn fail(bytes_written: u64, error: ProxyError) -> ForwardOutcome {
    tracing::Span::current().record("bytes_written", bytes_written);
    tracing::debug!(error = %error, bytes_written, "Forward failed");
    ForwardOutcome::failed(bytes_written, error)
}
