//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! caller POST /api/v2/queryproxysvc
//!     → server.rs (Axum setup, request ID, tracing, timeouts)
//!     → handler.rs (decode, dialect capability check, header write)
//!     → client.rs (serialize, POST to the remote, stream body into sink.rs)
//!     → handler.rs (structured error if zero bytes written, else log and cut)
//!     → caller
//! ```

pub mod client;
pub mod handler;
pub mod request;
pub mod response;
pub mod server;
pub mod service;
pub mod sink;

/// Path served inbound and called on the remote.
pub const PROXY_QUERY_PATH: &str = "/api/v2/queryproxysvc";

pub use client::ForwardingClient;
pub use handler::{classify, Disposition, QueryHandlerState};
pub use request::{RequestContext, X_REQUEST_ID};
pub use server::HttpServer;
pub use service::{ForwardOutcome, ProxyQueryService};
pub use sink::{ChannelSink, ResponseSink};
