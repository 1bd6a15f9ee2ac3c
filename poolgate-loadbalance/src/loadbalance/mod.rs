pub mod backend;
pub mod selector;
pub mod pool;
pub mod health_checker;
pub mod service;

pub use backend::{Backend, InFlightGuard};
pub use selector::{create_selector, LeastConnectionsSelector, PeerSelector, RoundRobinSelector};
pub use pool::{BackendStatus, HealthStats, ServerPool};
pub use health_checker::{probe, HealthChecker, HealthSummary, ProbeFn};
pub use service::{LoadBalanceService, ServiceHealth};
