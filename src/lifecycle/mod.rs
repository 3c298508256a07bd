//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Shutdown::trigger
//!
//! Shutdown (shutdown.rs):
//!     trigger → servers stop accepting → in-flight streams finish → exit
//! ```
//!
//! # Design Decisions
//! - Config is loaded before anything binds; listeners start last
//! - Shutdown drains in-flight requests instead of cutting them

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;
