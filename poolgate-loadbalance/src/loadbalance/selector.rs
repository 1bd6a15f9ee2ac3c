use super::backend::Backend;
use poolgate_core::LoadBalanceStrategy;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

/// 后端选择策略接口
///
/// 策略在服务池构造时确定，运行期不可切换。新增策略只需新增一个实现。
pub trait PeerSelector: Send + Sync {
    /// 从有序后端列表中挑选下一个可用后端，没有可用后端时返回 `None`
    fn next_valid_peer(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>>;

    /// 策略名称
    fn name(&self) -> &'static str;
}

/// 根据配置的策略创建选择器
pub fn create_selector(strategy: LoadBalanceStrategy) -> Box<dyn PeerSelector> {
    match strategy {
        LoadBalanceStrategy::RoundRobin => Box::new(RoundRobinSelector::new()),
        LoadBalanceStrategy::LeastConnected => Box::new(LeastConnectionsSelector),
    }
}

/// 轮询选择器
///
/// 游标初始为 0，第一次选择返回下标 1 的后端。
pub struct RoundRobinSelector {
    current: AtomicUsize,
}

impl RoundRobinSelector {
    pub fn new() -> Self {
        Self {
            current: AtomicUsize::new(0),
        }
    }

    /// 当前游标位置
    #[cfg(test)]
    fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// 推进游标并返回新位置的后端
    ///
    /// 读-改-写在一次原子操作内完成，并发调用各自拿到不同的槽位。
    /// 调用方保证 `backends` 非空。
    fn rotate(&self, backends: &[Arc<Backend>]) -> Arc<Backend> {
        let len = backends.len();
        let previous = self
            .current
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |current| {
                Some((current + 1) % len)
            })
            .unwrap_or_else(|current| current);
        let next = (previous + 1) % len;
        backends[next].clone()
    }
}

impl Default for RoundRobinSelector {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerSelector for RoundRobinSelector {
    fn next_valid_peer(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        if backends.is_empty() {
            return None;
        }

        // 最多转一整圈，每个后端探查一次
        for _ in 0..backends.len() {
            let peer = self.rotate(backends);
            if peer.is_alive() {
                return Some(peer);
            }
            tracing::debug!("Skipping dead backend {}", peer.url());
        }

        None
    }

    fn name(&self) -> &'static str {
        "round-robin"
    }
}

/// 最少连接选择器
///
/// 线性扫描全部存活后端，取活动连接数严格最小者，相同时先插入的胜出。
/// 各后端字段分别读取，结果是选择瞬间的近似值，不是整池快照。
pub struct LeastConnectionsSelector;

impl PeerSelector for LeastConnectionsSelector {
    fn next_valid_peer(&self, backends: &[Arc<Backend>]) -> Option<Arc<Backend>> {
        let mut least: Option<(&Arc<Backend>, usize)> = None;

        for backend in backends {
            if !backend.is_alive() {
                continue;
            }

            let connections = backend.active_connections();
            match least {
                Some((_, best)) if connections >= best => {}
                _ => least = Some((backend, connections)),
            }
        }

        least.map(|(backend, _)| backend.clone())
    }

    fn name(&self) -> &'static str {
        "least-connected"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::response::Response;
    use poolgate_core::{ProxyRequest, Relay, RelayError};
    use reqwest::Url;

    struct NoopRelay;

    #[async_trait]
    impl Relay for NoopRelay {
        async fn forward(&self, _target: &Url, _request: ProxyRequest) -> Result<Response, RelayError> {
            Ok(Response::default())
        }
    }

    fn backends(count: usize) -> Vec<Arc<Backend>> {
        let relay: Arc<dyn Relay> = Arc::new(NoopRelay);
        (0..count)
            .map(|i| {
                let url = Url::parse(&format!("http://localhost:{}", 3333 + i)).unwrap();
                Arc::new(Backend::new(url, relay.clone()))
            })
            .collect()
    }

    fn port_of(backend: &Arc<Backend>) -> u16 {
        backend.url().port().unwrap()
    }

    #[test]
    fn test_round_robin_starts_after_cursor() {
        let pool = backends(3);
        let selector = RoundRobinSelector::new();

        let picked: Vec<u16> = (0..3)
            .map(|_| port_of(&selector.next_valid_peer(&pool).unwrap()))
            .collect();
        assert_eq!(picked, vec![3334, 3335, 3333]);
    }

    #[test]
    fn test_round_robin_full_cycle_visits_each_once() {
        for size in 1..=6 {
            let pool = backends(size);
            let selector = RoundRobinSelector::new();

            let mut ports: Vec<u16> = (0..size)
                .map(|_| port_of(&selector.next_valid_peer(&pool).unwrap()))
                .collect();
            ports.sort_unstable();
            ports.dedup();
            assert_eq!(ports.len(), size);
        }
    }

    #[test]
    fn test_round_robin_skips_dead() {
        let pool = backends(3);
        pool[1].set_alive(false);
        let selector = RoundRobinSelector::new();

        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3335);
        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3333);
        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3335);
    }

    #[test]
    fn test_round_robin_all_dead() {
        let pool = backends(3);
        for backend in &pool {
            backend.set_alive(false);
        }
        let selector = RoundRobinSelector::new();

        assert!(selector.next_valid_peer(&pool).is_none());
        // 一整圈后游标回到原位
        assert_eq!(selector.current(), 0);
    }

    #[test]
    fn test_round_robin_empty_pool() {
        let selector = RoundRobinSelector::new();
        assert!(selector.next_valid_peer(&[]).is_none());
        assert_eq!(selector.current(), 0);
    }

    #[test]
    fn test_round_robin_concurrent_rotation() {
        let pool = Arc::new(backends(3));
        let selector = Arc::new(RoundRobinSelector::new());

        let handles: Vec<_> = [3usize, 2]
            .into_iter()
            .map(|calls| {
                let pool = pool.clone();
                let selector = selector.clone();
                std::thread::spawn(move || {
                    for _ in 0..calls {
                        selector.next_valid_peer(&pool);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        // 5 次旋转后游标在下标 2，下一次回到第一个后端
        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3333);
    }

    #[test]
    fn test_least_connections_prefers_idle() {
        let pool = backends(2);
        let _busy = pool[0].acquire();

        let selector = LeastConnectionsSelector;
        let peer = selector.next_valid_peer(&pool).unwrap();
        assert_eq!(port_of(&peer), 3334);
        assert_eq!(peer.active_connections(), 0);
    }

    #[test]
    fn test_least_connections_tie_prefers_first() {
        let pool = backends(3);
        let _a = pool[0].acquire();
        let _b = pool[1].acquire();
        let _c = pool[2].acquire();

        let selector = LeastConnectionsSelector;
        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3333);
    }

    #[test]
    fn test_least_connections_skips_dead() {
        let pool = backends(3);
        pool[0].set_alive(false);
        let _b = pool[1].acquire();
        let _b2 = pool[1].acquire();
        let _c = pool[2].acquire();

        let selector = LeastConnectionsSelector;
        assert_eq!(port_of(&selector.next_valid_peer(&pool).unwrap()), 3335);
    }

    #[test]
    fn test_least_connections_all_dead_or_empty() {
        let selector = LeastConnectionsSelector;
        assert!(selector.next_valid_peer(&[]).is_none());

        let pool = backends(2);
        pool[0].set_alive(false);
        pool[1].set_alive(false);
        assert!(selector.next_valid_peer(&pool).is_none());
    }

    #[test]
    fn test_create_selector_names() {
        assert_eq!(create_selector(LoadBalanceStrategy::RoundRobin).name(), "round-robin");
        assert_eq!(
            create_selector(LoadBalanceStrategy::LeastConnected).name(),
            "least-connected"
        );
    }
}
