use axum::extract::{ConnectInfo, Request};
use axum::http::header;
use axum::response::{IntoResponse, Response};
use http_body_util::LengthLimitError;
use poolgate_core::ProxyRequest;
use poolgate_loadbalance::LoadBalanceService;
use std::net::SocketAddr;
use std::sync::Arc;

use super::retry::DispatchRequest;
use super::types::DispatchError;

/// 默认请求体上限，16 MiB
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

/// 负载均衡的请求处理器
///
/// 每个请求选一个后端转发，失败时把该后端标记为不可用并换一个后端重试一次。
pub struct LoadBalancedHandler {
    load_balancer: Arc<LoadBalanceService>,
    max_body_bytes: usize,
}

impl LoadBalancedHandler {
    pub fn new(load_balancer: Arc<LoadBalanceService>) -> Self {
        Self::with_body_limit(load_balancer, DEFAULT_MAX_BODY_BYTES)
    }

    pub fn with_body_limit(load_balancer: Arc<LoadBalanceService>, max_body_bytes: usize) -> Self {
        Self {
            load_balancer,
            max_body_bytes,
        }
    }

    pub fn load_balancer(&self) -> &Arc<LoadBalanceService> {
        &self.load_balancer
    }

    /// 处理入站 HTTP 请求
    pub async fn handle(&self, request: Request) -> Response {
        match self.buffer_request(request).await {
            Ok(request) => self.serve(request).await,
            Err(e) => {
                tracing::warn!("Rejecting request: {}", e);
                e.into_response()
            }
        }
    }

    /// 读取整个请求体，生成可重放的转发请求
    pub async fn buffer_request(&self, request: Request) -> Result<ProxyRequest, DispatchError> {
        let limit = self.max_body_bytes;
        let (parts, body) = request.into_parts();

        let declared_length = parts
            .headers
            .get(header::CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<usize>().ok());
        if declared_length.is_some_and(|length| length > limit) {
            return Err(DispatchError::BodyTooLarge { limit });
        }

        let body = axum::body::to_bytes(body, limit).await.map_err(|e| {
            if is_length_limit_error(&e) {
                DispatchError::BodyTooLarge { limit }
            } else {
                DispatchError::BodyRead(e.to_string())
            }
        })?;

        let client_addr = parts
            .extensions
            .get::<ConnectInfo<SocketAddr>>()
            .map(|ConnectInfo(addr)| *addr);
        let path_and_query = parts
            .uri
            .path_and_query()
            .map(|pq| pq.as_str())
            .unwrap_or("/");

        Ok(ProxyRequest::new(parts.method, path_and_query)
            .with_headers(parts.headers)
            .with_body(body)
            .with_client_addr(client_addr))
    }

    /// 转发已缓冲的请求，失败时返回 503
    pub async fn serve(&self, request: ProxyRequest) -> Response {
        match self.dispatch(DispatchRequest::new(request)).await {
            Ok(response) => response,
            Err(e) => {
                tracing::error!("Request dispatch failed: {}", e);
                e.into_response()
            }
        }
    }

    /// 选择后端并转发，最多重试一次
    ///
    /// 上游返回的任何 HTTP 状态码都视为成功；只有连接失败等传输错误会触发重试。
    pub async fn dispatch(&self, mut request: DispatchRequest) -> Result<Response, DispatchError> {
        let pool = self.load_balancer.pool();

        loop {
            let Some(peer) = pool.next_valid_peer() else {
                tracing::warn!(
                    "No backend available for {} {}",
                    request.request().method,
                    request.request().path()
                );
                return Err(DispatchError::NoBackendAvailable);
            };

            tracing::debug!(
                "Routing {} {} to {} (retry: {})",
                request.request().method,
                request.request().path(),
                peer.url(),
                request.retry_attempted()
            );

            let error = match peer.relay(request.request().clone()).await {
                Ok(response) => return Ok(response),
                Err(e) => e,
            };

            if error.is_connect() {
                tracing::warn!("Error handling the request on {}: {}", peer.url(), error);
            } else {
                tracing::error!("Error handling the request on {}: {}", peer.url(), error);
            }
            peer.set_alive(false);

            if !request.allow_retry() {
                tracing::info!("Max retry attempts reached, terminating");
                return Err(DispatchError::RetryExhausted {
                    backend: peer.url().to_string(),
                    source: error,
                });
            }

            tracing::info!("Attempting retry with another backend");
            request = request.into_retry();
        }
    }
}

fn is_length_limit_error(error: &axum::Error) -> bool {
    let mut source: Option<&(dyn std::error::Error + 'static)> = Some(error);
    while let Some(current) = source {
        if current.downcast_ref::<LengthLimitError>().is_some() {
            return true;
        }
        source = current.source();
    }
    false
}
