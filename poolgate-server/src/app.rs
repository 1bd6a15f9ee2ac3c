use poolgate_core::config::loader::{get_config_path, load_config};
use poolgate_core::{Config, Relay};
use poolgate_loadbalance::LoadBalanceService;
use poolgate_relay::{HttpRelay, LoadBalancedHandler};
use crate::router::router::{create_admin_router, create_proxy_router};

use anyhow::Result;
use axum::Router;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

/// 应用状态，包含负载均衡服务
#[derive(Clone)]
pub struct AppState {
    pub load_balancer: Arc<LoadBalanceService>,
    pub handler: Arc<LoadBalancedHandler>,
    pub config: Arc<Config>,
}

impl AppState {
    /// 使用 reqwest 转发实现创建应用状态
    pub fn new(config: Config, shutdown: CancellationToken) -> Result<Self> {
        let relay = Arc::new(HttpRelay::from_settings(&config.settings)?);
        Self::with_relay(config, relay, shutdown)
    }

    /// 使用指定的转发实现创建应用状态，健康检查尚未启动
    pub fn with_relay(
        config: Config,
        relay: Arc<dyn Relay>,
        shutdown: CancellationToken,
    ) -> Result<Self> {
        let load_balancer = Arc::new(LoadBalanceService::with_shutdown(&config, relay, shutdown)?);

        if config.max_attempt_limit > 1 {
            info!(
                "max_attempt_limit is {}, failed requests are retried once on another backend",
                config.max_attempt_limit
            );
        }

        let handler = Arc::new(LoadBalancedHandler::with_body_limit(
            load_balancer.clone(),
            config.settings.max_request_body_bytes,
        ));

        Ok(Self {
            load_balancer,
            handler,
            config: Arc::new(config),
        })
    }

    /// 启动后台健康检查
    pub async fn start(&self) -> Result<()> {
        self.load_balancer.start().await?;
        info!("Load balance service started");
        Ok(())
    }

    /// 停止应用
    pub async fn shutdown(&self) {
        info!("Shutting down application...");
        self.load_balancer.stop().await;
        info!("Application shutdown complete");
    }
}

/// 创建代理应用，所有方法和路径都转发到后端
pub fn create_app(state: AppState) -> Router {
    create_proxy_router().with_state(state)
}

/// 创建只读管理应用
pub fn create_admin_app(state: AppState) -> Router {
    create_admin_router().with_state(state)
}

/// 启动应用服务器
pub async fn start_server() -> Result<()> {
    // 初始化日志，未设置 RUST_LOG 时默认 info
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_file(true)
        .with_line_number(true)
        .init();

    info!("Starting Poolgate server v{}", env!("CARGO_PKG_VERSION"));

    let config_path = get_config_path();
    info!("Configuration file: {}", config_path);

    let config = match load_config() {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            return Err(e);
        }
    };

    let shutdown = CancellationToken::new();

    // 创建应用状态
    let app_state = match AppState::new(config, shutdown.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!("Failed to initialize application: {}", e);
            return Err(e);
        }
    };

    let settings = app_state.config.settings.clone();
    let grace = settings.shutdown_grace_period();

    let bind_addr = SocketAddr::from(([0, 0, 0, 0], app_state.config.lb_port));
    let listener = match TcpListener::bind(bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind {}: {}", bind_addr, e);
            return Err(e.into());
        }
    };
    info!("Load Balancer started at :{}", app_state.config.lb_port);

    let admin_listener = match settings.admin_port {
        Some(port) => {
            let admin_addr = SocketAddr::from(([0, 0, 0, 0], port));
            match TcpListener::bind(admin_addr).await {
                Ok(listener) => {
                    info!("Admin endpoints listening on http://{}", admin_addr);
                    info!("  GET  /health    - Pool health");
                    info!("  GET  /backends  - Backend status");
                    Some(listener)
                }
                Err(e) => {
                    error!("Failed to bind admin listener {}: {}", admin_addr, e);
                    return Err(e.into());
                }
            }
        }
        None => None,
    };

    app_state.start().await?;

    tokio::spawn(shutdown_signal(shutdown.clone()));

    let proxy = serve_until_shutdown(
        "proxy",
        listener,
        create_app(app_state.clone()),
        shutdown.clone(),
        grace,
    );

    let result = match admin_listener {
        Some(admin_listener) => {
            let admin = serve_until_shutdown(
                "admin",
                admin_listener,
                create_admin_app(app_state.clone()),
                shutdown.clone(),
                grace,
            );
            tokio::try_join!(proxy, admin).map(|_| ())
        }
        None => proxy.await,
    };

    if let Err(e) = &result {
        error!("Server error: {}", e);
    }

    app_state.shutdown().await;
    result
}

/// 运行 HTTP 服务直到收到关闭信号
///
/// 收到信号后停止接受新连接，已有请求最多再处理 `grace` 时长，超时后中止服务任务，剩余连接随进程退出。
/// 服务自身异常退出时会取消 `shutdown`，让其他监听器一起退出。
pub async fn serve_until_shutdown(
    name: &'static str,
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
    grace: Duration,
) -> Result<()> {
    let signal = shutdown.clone();
    let mut server = tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move { signal.cancelled().await })
        .await
    });

    tokio::select! {
        joined = &mut server => {
            shutdown.cancel();
            joined??;
            return Ok(());
        }
        _ = shutdown.cancelled() => {}
    }

    info!("Draining {} connections for up to {:?}", name, grace);
    match tokio::time::timeout(grace, &mut server).await {
        Ok(joined) => {
            joined??;
            info!("{} server stopped", name);
        }
        Err(_) => {
            warn!(
                "{} server did not drain within {:?}, abandoning remaining connections",
                name, grace
            );
            server.abort();
        }
    }

    Ok(())
}

/// 等待 SIGINT / SIGTERM 并取消全局关闭信号
pub async fn shutdown_signal(shutdown: CancellationToken) {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to install CTRL+C signal handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
        _ = shutdown.cancelled() => return,
    }

    info!("Shutdown signal received");
    shutdown.cancel();
}
