use super::backend::Backend;
use super::health_checker::{HealthChecker, HealthSummary};
use super::pool::{BackendStatus, HealthStats, ServerPool};
use anyhow::Result;
use poolgate_core::{Config, Relay};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

/// 负载均衡服务
/// 整合服务池和健康检查器，提供统一的服务接口
pub struct LoadBalanceService {
    pool: Arc<ServerPool>,
    health_checker: Arc<HealthChecker>,
    max_attempt_limit: u32,
    shutdown: CancellationToken,
    health_task: Mutex<Option<JoinHandle<()>>>,
}

impl LoadBalanceService {
    /// 创建新的负载均衡服务
    ///
    /// 按配置顺序创建后端，全部使用同一个转发实现。
    pub fn new(config: &Config, relay: Arc<dyn Relay>) -> Result<Self> {
        Self::with_shutdown(config, relay, CancellationToken::new())
    }

    /// 创建服务，健康检查绑定到外部取消信号的子信号上
    pub fn with_shutdown(
        config: &Config,
        relay: Arc<dyn Relay>,
        parent: CancellationToken,
    ) -> Result<Self> {
        // 验证配置
        config.validate()?;

        let mut pool = ServerPool::new(config.strategy);
        for url in config.backend_urls()? {
            debug!("Adding backend {} to pool", url);
            pool.add_backend(Arc::new(Backend::new(url, relay.clone())));
        }
        let pool = Arc::new(pool);

        let health_checker = Arc::new(HealthChecker::from_settings(pool.clone(), &config.settings));

        info!(
            "Configured {} backends with strategy '{}'",
            pool.size(),
            pool.strategy()
        );

        Ok(Self {
            pool,
            health_checker,
            max_attempt_limit: config.max_attempt_limit,
            shutdown: parent.child_token(),
            health_task: Mutex::new(None),
        })
    }

    /// 启动后台健康检查
    pub async fn start(&self) -> Result<()> {
        let mut task = self.health_task.lock().await;
        if task.is_some() {
            return Ok(());
        }

        if self.shutdown.is_cancelled() {
            anyhow::bail!("Load balance service has already been stopped");
        }

        info!("Starting load balance service");

        let health_checker = self.health_checker.clone();
        let cancel = self.shutdown.clone();
        *task = Some(tokio::spawn(async move {
            health_checker.start(cancel).await;
        }));

        info!("Load balance service started successfully");
        Ok(())
    }

    /// 停止负载均衡服务，等待健康检查退出
    pub async fn stop(&self) {
        self.shutdown.cancel();

        if let Some(handle) = self.health_task.lock().await.take() {
            if let Err(e) = handle.await {
                error!("Health check task ended abnormally: {}", e);
            }
        }

        info!("Load balance service stopped");
    }

    /// 检查服务是否正在运行
    pub async fn is_running(&self) -> bool {
        !self.shutdown.is_cancelled() && self.health_task.lock().await.is_some()
    }

    /// 手动触发一轮健康检查
    pub async fn trigger_health_check(&self) -> HealthSummary {
        self.health_checker.check_now(&self.shutdown).await
    }

    pub fn pool(&self) -> Arc<ServerPool> {
        self.pool.clone()
    }

    /// 配置中的最大尝试次数提示
    pub fn max_attempt_limit(&self) -> u32 {
        self.max_attempt_limit
    }

    /// 获取服务健康状态
    pub fn get_service_health(&self) -> ServiceHealth {
        ServiceHealth {
            strategy: self.pool.strategy().to_string(),
            stats: self.pool.health_stats(),
            backends: self.pool.backend_statuses(),
        }
    }
}

/// 服务健康状态
#[derive(Debug, Clone, Serialize)]
pub struct ServiceHealth {
    pub strategy: String,
    pub stats: HealthStats,
    pub backends: Vec<BackendStatus>,
}

impl ServiceHealth {
    pub fn is_healthy(&self) -> bool {
        self.stats.is_healthy()
    }
}
