//! Observability subsystem.
//!
//! # Data Flow
//! ```text
//! inbound request
//!     → tracing.rs (traceparent extracted, child context injected upstream)
//!     → logging.rs (structured log events, one per partial failure)
//!     → metrics.rs (request, forward and partial-failure counters)
//! ```
//!
//! # Design Decisions
//! - Request ID flows through all log lines of a request
//! - Metrics are cheap and optional

pub mod logging;
pub mod metrics;
pub mod tracing;
