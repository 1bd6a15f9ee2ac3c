use anyhow::Result;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Config {
    /// 负载均衡器监听端口
    #[serde(default)]
    pub lb_port: u16,
    /// 后端地址列表，顺序即轮询顺序
    #[serde(default)]
    pub backends: Vec<String>,
    #[serde(default)]
    pub strategy: LoadBalanceStrategy,
    /// 最大尝试次数提示，当前调度器固定只重试一次
    #[serde(default = "default_max_attempt_limit")]
    pub max_attempt_limit: u32,
    #[serde(default)]
    pub settings: GlobalSettings,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct GlobalSettings {
    #[serde(default = "default_health_check_interval")]
    pub health_check_interval_seconds: u64,
    #[serde(default = "default_health_check_timeout")]
    pub health_check_timeout_seconds: u64,
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_seconds: u64,
    #[serde(default = "default_shutdown_grace_period")]
    pub shutdown_grace_period_seconds: u64,
    #[serde(default = "default_max_request_body_bytes")]
    pub max_request_body_bytes: usize,
    /// 管理接口端口，不设置则不启动
    #[serde(default)]
    pub admin_port: Option<u16>,
}

impl Default for GlobalSettings {
    fn default() -> Self {
        Self {
            health_check_interval_seconds: default_health_check_interval(),
            health_check_timeout_seconds: default_health_check_timeout(),
            connect_timeout_seconds: default_connect_timeout(),
            shutdown_grace_period_seconds: default_shutdown_grace_period(),
            max_request_body_bytes: default_max_request_body_bytes(),
            admin_port: None,
        }
    }
}

impl GlobalSettings {
    pub fn health_check_interval(&self) -> Duration {
        Duration::from_secs(self.health_check_interval_seconds)
    }

    pub fn health_check_timeout(&self) -> Duration {
        Duration::from_secs(self.health_check_timeout_seconds)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_seconds)
    }

    pub fn shutdown_grace_period(&self) -> Duration {
        Duration::from_secs(self.shutdown_grace_period_seconds)
    }
}

/// 负载均衡策略
///
/// 配置中写 `"least-connected"` 选择最少连接，其余任何值都回退到轮询。
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum LoadBalanceStrategy {
    /// 轮询
    #[default]
    RoundRobin,
    /// 最少活动连接
    LeastConnected,
}

impl LoadBalanceStrategy {
    pub fn from_name(name: &str) -> Self {
        match name {
            "least-connected" => Self::LeastConnected,
            _ => Self::RoundRobin,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RoundRobin => "round-robin",
            Self::LeastConnected => "least-connected",
        }
    }
}

impl From<String> for LoadBalanceStrategy {
    fn from(value: String) -> Self {
        Self::from_name(&value)
    }
}

impl From<LoadBalanceStrategy> for String {
    fn from(value: LoadBalanceStrategy) -> Self {
        value.as_str().to_string()
    }
}

impl std::fmt::Display for LoadBalanceStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// Default value functions
fn default_max_attempt_limit() -> u32 {
    3
}

fn default_health_check_interval() -> u64 {
    20
}

fn default_health_check_timeout() -> u64 {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_shutdown_grace_period() -> u64 {
    10
}

fn default_max_request_body_bytes() -> usize {
    16 * 1024 * 1024
}

impl Config {
    /// 验证配置的有效性
    pub fn validate(&self) -> Result<()> {
        if self.backends.is_empty() {
            anyhow::bail!("backend host expected, none provided");
        }

        if self.lb_port == 0 {
            anyhow::bail!("load balancer port not found");
        }

        if self.max_attempt_limit == 0 {
            anyhow::bail!("max_attempt_limit must be at least 1");
        }

        for backend in &self.backends {
            Self::validate_backend_url(backend)?;
        }

        self.validate_settings()
    }

    /// 解析并验证单个后端地址
    pub fn validate_backend_url(raw: &str) -> Result<Url> {
        let url = Url::parse(raw)
            .map_err(|e| anyhow::anyhow!("Backend URL '{}' is malformed: {}", raw, e))?;

        if url.scheme() != "http" && url.scheme() != "https" {
            anyhow::bail!(
                "Backend URL '{}' has unsupported scheme '{}'. Must be http or https",
                raw,
                url.scheme()
            );
        }

        match url.host_str() {
            Some(host) if !host.is_empty() => {}
            _ => anyhow::bail!("Backend URL '{}' has no host", raw),
        }

        Ok(url)
    }

    fn validate_settings(&self) -> Result<()> {
        let settings = &self.settings;

        if settings.health_check_interval_seconds == 0 {
            anyhow::bail!("health_check_interval_seconds cannot be 0");
        }

        if settings.health_check_timeout_seconds == 0 {
            anyhow::bail!("health_check_timeout_seconds cannot be 0");
        }

        if settings.connect_timeout_seconds == 0 {
            anyhow::bail!("connect_timeout_seconds cannot be 0");
        }

        if settings.max_request_body_bytes == 0 {
            anyhow::bail!("max_request_body_bytes cannot be 0");
        }

        match settings.admin_port {
            Some(0) => anyhow::bail!("admin_port cannot be 0"),
            Some(port) if port == self.lb_port => {
                anyhow::bail!("admin_port {} collides with lb_port", port)
            }
            _ => {}
        }

        Ok(())
    }

    /// 按配置顺序解析全部后端地址
    pub fn backend_urls(&self) -> Result<Vec<Url>> {
        self.backends
            .iter()
            .map(|raw| Self::validate_backend_url(raw))
            .collect()
    }
}
