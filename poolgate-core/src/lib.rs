//! Poolgate Core Library
//!
//! This library provides core functionality for the Poolgate load balancer including:
//! - Configuration management
//! - The upstream relay capability consumed by the backend pool
//! - Shared request and error types

pub mod config;
pub mod client;

// Re-export commonly used types
pub use config::model::{Config, GlobalSettings, LoadBalanceStrategy};
pub use client::{join_target_url, ProxyRequest, Relay, RelayError};
