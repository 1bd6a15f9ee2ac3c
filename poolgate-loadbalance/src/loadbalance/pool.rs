use super::backend::Backend;
use super::selector::{create_selector, PeerSelector};
use poolgate_core::LoadBalanceStrategy;
use serde::Serialize;
use std::sync::Arc;

/// 后端服务池
///
/// 后端顺序在构造时确定且只追加，决定轮询顺序；选择完全委托给构造时确定的策略。
pub struct ServerPool {
    backends: Vec<Arc<Backend>>,
    strategy: LoadBalanceStrategy,
    selector: Box<dyn PeerSelector>,
}

impl ServerPool {
    /// 创建空的服务池
    pub fn new(strategy: LoadBalanceStrategy) -> Self {
        Self {
            backends: Vec::new(),
            strategy,
            selector: create_selector(strategy),
        }
    }

    /// 追加后端，池被共享之前调用
    pub fn add_backend(&mut self, backend: Arc<Backend>) {
        self.backends.push(backend);
    }

    pub fn backends(&self) -> &[Arc<Backend>] {
        &self.backends
    }

    /// 选择下一个可用后端
    pub fn next_valid_peer(&self) -> Option<Arc<Backend>> {
        self.selector.next_valid_peer(&self.backends)
    }

    pub fn size(&self) -> usize {
        self.backends.len()
    }

    pub fn strategy(&self) -> LoadBalanceStrategy {
        self.strategy
    }

    /// 获取池的健康状态统计
    pub fn health_stats(&self) -> HealthStats {
        let total_backends = self.backends.len();
        let healthy_backends = self.backends.iter().filter(|b| b.is_alive()).count();

        HealthStats {
            healthy_backends,
            total_backends,
            health_ratio: if total_backends > 0 {
                healthy_backends as f64 / total_backends as f64
            } else {
                0.0
            },
        }
    }

    /// 各后端当前状态
    pub fn backend_statuses(&self) -> Vec<BackendStatus> {
        self.backends
            .iter()
            .map(|backend| BackendStatus {
                url: backend.url().to_string(),
                alive: backend.is_alive(),
                active_connections: backend.active_connections(),
            })
            .collect()
    }
}

/// 健康状态统计
#[derive(Debug, Clone, Serialize)]
pub struct HealthStats {
    pub healthy_backends: usize,
    pub total_backends: usize,
    pub health_ratio: f64,
}

impl HealthStats {
    /// 至少有一个后端存活
    pub fn is_healthy(&self) -> bool {
        self.health_ratio > 0.0
    }

    /// 全部后端存活
    pub fn is_fully_healthy(&self) -> bool {
        self.health_ratio >= 1.0
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub url: String,
    pub alive: bool,
    pub active_connections: usize,
}
