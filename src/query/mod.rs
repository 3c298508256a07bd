//! Query request model.
//!
//! # Data Flow
//! ```text
//! inbound JSON body
//!     → request.rs (envelope with compiler_type / dialect_type tags)
//!     → mappings.rs (tag → factory → Box<dyn Compiler> / Box<dyn Dialect>)
//!     → ProxyRequest (immutable, moved into the forward task)
//!     → request.rs (serialized again for the outbound call)
//! ```
//!
//! # Design Decisions
//! - Variants are resolved through registries populated at startup, never by reflection
//! - Compilation and result encoding happen on the remote; the proxy only carries the payloads
//! - A dialect that cannot describe its HTTP headers is rejected before anything is written

use axum::http::HeaderMap;
use serde_json::Value;
use std::fmt;

pub mod builtin;
pub mod mappings;
pub mod request;

pub use mappings::{CompilerMappings, DialectMappings, TypeMappings};
pub use request::{ProxyRequest, Request};

/// A query in some source form, compiled by the remote backend.
pub trait Compiler: fmt::Debug + Send + Sync {
    /// Tag under which the variant is registered and serialized.
    fn compiler_type(&self) -> &str;

    /// Payload serialized next to the tag.
    fn to_json(&self) -> serde_json::Result<Value>;

    /// Semantic checks run at decode time.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// An output encoding for query results.
pub trait Dialect: fmt::Debug + Send + Sync {
    fn dialect_type(&self) -> &str;

    fn to_json(&self) -> serde_json::Result<Value>;

    fn validate(&self) -> Result<(), String> {
        Ok(())
    }

    /// The header-writing capability, if the dialect can be served over HTTP.
    fn as_http(&self) -> Option<&dyn HttpDialect> {
        None
    }
}

/// A dialect that can describe its encoding in HTTP response headers.
pub trait HttpDialect {
    fn set_headers(&self, headers: &mut HeaderMap);
}
