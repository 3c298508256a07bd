//! Network layer subsystem.
//!
//! The listener is plain TCP unless `listener.tls` is configured, in which case connections are
//! terminated with rustls through `axum-server`.

pub mod tls;
