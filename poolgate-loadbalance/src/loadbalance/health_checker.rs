use super::backend::Backend;
use super::pool::ServerPool;
use futures::future::BoxFuture;
use poolgate_core::GlobalSettings;
use reqwest::Url;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::task::AbortHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 单个后端的存活探测，超时由检查器统一施加
pub type ProbeFn = Arc<dyn Fn(Url) -> BoxFuture<'static, bool> + Send + Sync>;

/// 健康检查器
/// 定期对池中每个后端做 TCP 连接探测并更新存活标记
pub struct HealthChecker {
    pool: Arc<ServerPool>,
    check_interval: Duration,
    probe_timeout: Duration,
    probe: ProbeFn,
}

/// 单轮健康检查结果
#[derive(Debug, Clone, Default, Serialize)]
pub struct HealthSummary {
    pub checked: usize,
    pub alive: usize,
    pub dead: usize,
    /// 本轮是否因取消而提前结束
    pub cancelled: bool,
}

impl HealthChecker {
    /// 创建新的健康检查器
    pub fn new(pool: Arc<ServerPool>, check_interval: Duration, probe_timeout: Duration) -> Self {
        Self {
            pool,
            check_interval,
            probe_timeout,
            probe: Arc::new(|url: Url| -> BoxFuture<'static, bool> {
                Box::pin(async move { connect(&url).await })
            }),
        }
    }

    /// 替换默认的 TCP 连接探测
    pub fn with_probe(mut self, probe: ProbeFn) -> Self {
        self.probe = probe;
        self
    }

    pub fn from_settings(pool: Arc<ServerPool>, settings: &GlobalSettings) -> Self {
        Self::new(
            pool,
            settings.health_check_interval(),
            settings.health_check_timeout(),
        )
    }

    /// 启动健康检查循环
    ///
    /// 第一轮立即执行，之后按固定周期执行，上一轮结束前不会开始下一轮。
    /// 观察到取消后永久退出。
    pub async fn start(&self, cancel: CancellationToken) {
        info!(
            "Starting health check with interval: {:?}, probe timeout: {:?}",
            self.check_interval, self.probe_timeout
        );

        let mut interval = interval(self.check_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Closing health check");
                    return;
                }
                _ = interval.tick() => {}
            }

            let summary = self.check_now(&cancel).await;
            if summary.cancelled {
                info!("Closing health check");
                return;
            }
        }
    }

    /// 立即执行一轮健康检查
    ///
    /// 每个后端一个探测任务并发执行，结果按池顺序等待并应用。
    /// 等待期间观察到取消时中止剩余探测，不再应用任何结果。
    pub async fn check_now(&self, cancel: &CancellationToken) -> HealthSummary {
        let mut summary = HealthSummary::default();

        if cancel.is_cancelled() {
            summary.cancelled = true;
            return summary;
        }

        let backends = self.pool.backends();
        debug!("Starting health check for {} backends", backends.len());

        let mut tasks = Vec::with_capacity(backends.len());
        for backend in backends {
            let check = (self.probe)(backend.url().clone());
            let url = backend.url().clone();
            let timeout = self.probe_timeout;
            let task = tokio::spawn(async move { within_timeout(&url, timeout, check).await });
            tasks.push((backend.clone(), task));
        }

        let abort_handles: Vec<AbortHandle> =
            tasks.iter().map(|(_, task)| task.abort_handle()).collect();

        for (backend, task) in tasks {
            let joined = tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                joined = task => Some(joined),
            };

            let Some(joined) = joined else {
                for handle in &abort_handles {
                    handle.abort();
                }
                info!("Gracefully shutting down health check");
                summary.cancelled = true;
                return summary;
            };

            let alive = match joined {
                Ok(alive) => alive,
                Err(e) => {
                    error!("Health probe task failed for {}: {}", backend.url(), e);
                    false
                }
            };

            Self::apply_probe_result(&backend, alive);
            summary.checked += 1;
            if alive {
                summary.alive += 1;
            } else {
                summary.dead += 1;
            }
        }

        debug!(
            "Completed health check: {} alive, {} dead",
            summary.alive, summary.dead
        );
        summary
    }

    fn apply_probe_result(backend: &Backend, alive: bool) {
        let was_alive = backend.is_alive();
        backend.set_alive(alive);

        match (was_alive, alive) {
            (false, true) => info!("Backend {} is back up", backend.url()),
            (true, false) => warn!("Backend {} is down", backend.url()),
            _ => debug!(
                "Backend {} status: {}",
                backend.url(),
                if alive { "up" } else { "down" }
            ),
        }
    }
}

/// 对后端地址做一次 TCP 连接探测
///
/// 在超时内建立连接（随即关闭）视为存活，连接错误或超时视为不可达。
pub async fn probe(url: &Url, timeout: Duration) -> bool {
    within_timeout(url, timeout, connect(url)).await
}

/// 超时未完成的探测视为不可达
async fn within_timeout<F>(url: &Url, timeout: Duration, check: F) -> bool
where
    F: std::future::Future<Output = bool>,
{
    match tokio::time::timeout(timeout, check).await {
        Ok(alive) => alive,
        Err(_) => {
            debug!("Site unreachable {}: timed out after {:?}", url, timeout);
            false
        }
    }
}

async fn connect(url: &Url) -> bool {
    let Some(address) = probe_address(url) else {
        warn!("Backend {} has no resolvable host or port", url);
        return false;
    };

    match TcpStream::connect(address.as_str()).await {
        Ok(stream) => {
            drop(stream);
            true
        }
        Err(e) => {
            debug!("Site unreachable {}: {}", address, e);
            false
        }
    }
}

/// 探测用的 `host:port`，端口缺省时按 scheme 推断
fn probe_address(url: &Url) -> Option<String> {
    let host = url.host_str()?;
    let port = url.port_or_known_default()?;
    Some(format!("{}:{}", host, port))
}
