//! Poolgate Load Balance Library
//!
//! This library provides load balancing functionality for the Poolgate system including:
//! - Backends with liveness and in-flight connection tracking
//! - Backend selection strategies (round-robin, least-connections)
//! - Periodic TCP health checking
//! - The load balance service tying the pool to its health checker

pub mod loadbalance;

// Re-export commonly used types
pub use loadbalance::{
    Backend, BackendStatus, HealthChecker, HealthStats, HealthSummary, InFlightGuard,
    LoadBalanceService, PeerSelector, ProbeFn, ServerPool, ServiceHealth,
};
