pub mod loadbalanced;
pub mod retry;
pub mod types;

pub use loadbalanced::{LoadBalancedHandler, DEFAULT_MAX_BODY_BYTES};
pub use retry::DispatchRequest;
pub use types::*;
