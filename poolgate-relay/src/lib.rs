//! Poolgate Relay Library
//!
//! This library provides the forwarding side of the load balancer:
//! - An HTTP relay built on reqwest that streams upstream responses back
//! - The load balanced handler that picks a backend and retries once on failure
//! - Error types and JSON error responses

pub mod relay;

// Re-export commonly used types
pub use relay::client::HttpRelay;
pub use relay::handler::{DispatchError, DispatchRequest, LoadBalancedHandler};
