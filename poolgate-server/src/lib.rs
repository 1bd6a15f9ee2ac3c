//! Poolgate Server Library
//!
//! This library provides the HTTP front of the Poolgate load balancer:
//! the proxy listener, the optional read-only admin listener and graceful shutdown.

pub mod app;
pub mod router;

// Re-export the main server function
pub use app::start_server;
