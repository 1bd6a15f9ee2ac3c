use axum::body::Body;
use axum::response::Response;
use futures::StreamExt;
use parking_lot::RwLock;
use poolgate_core::{ProxyRequest, Relay, RelayError};
use reqwest::Url;
use std::sync::Arc;

/// 后端可变状态，由同一把读写锁保护
#[derive(Debug)]
struct BackendState {
    alive: bool,
    connections: usize,
}

/// 单个上游后端
///
/// 地址在创建后不可变；存活标记和活动连接数各自通过读写锁访问，
/// 一个后端一把锁，不存在覆盖整个池的全局锁。
pub struct Backend {
    url: Url,
    state: Arc<RwLock<BackendState>>,
    relay: Arc<dyn Relay>,
}

impl std::fmt::Debug for Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.read();
        f.debug_struct("Backend")
            .field("url", &self.url.as_str())
            .field("alive", &state.alive)
            .field("connections", &state.connections)
            .finish()
    }
}

impl Backend {
    /// 创建新的后端，初始为存活状态
    pub fn new(url: Url, relay: Arc<dyn Relay>) -> Self {
        Self {
            url,
            state: Arc::new(RwLock::new(BackendState {
                alive: true,
                connections: 0,
            })),
            relay,
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// 覆盖存活标记
    pub fn set_alive(&self, alive: bool) {
        self.state.write().alive = alive;
    }

    pub fn is_alive(&self) -> bool {
        self.state.read().alive
    }

    pub fn active_connections(&self) -> usize {
        self.state.read().connections
    }

    /// 占用一个在途连接名额，guard 释放时归还
    pub fn acquire(&self) -> InFlightGuard {
        InFlightGuard::new(self.state.clone())
    }

    /// 通过该后端转发请求
    ///
    /// 连接计数在转发开始时加一，在每条退出路径上减一：上游错误、
    /// 调用方放弃等待（future 被丢弃）都会释放。成功时 guard 跟随响应体，
    /// 直到响应体发送完毕或被丢弃才归还名额。
    pub async fn relay(&self, request: ProxyRequest) -> Result<Response, RelayError> {
        let guard = self.acquire();

        tracing::debug!(
            "Relaying {} {} to {} (active connections: {})",
            request.method,
            request.path_and_query,
            self.url,
            self.active_connections()
        );

        let response = self.relay.forward(&self.url, request).await?;
        Ok(attach_guard(response, guard))
    }
}

/// 把在途 guard 绑定到响应体流上
fn attach_guard(response: Response, guard: InFlightGuard) -> Response {
    let (parts, body) = response.into_parts();
    let stream = body.into_data_stream().map(move |chunk| {
        let _in_flight = &guard;
        chunk
    });
    Response::from_parts(parts, Body::from_stream(stream))
}

/// 在途连接名额
///
/// 创建时在写锁下递增连接数，Drop 时在写锁下递减。
#[must_use = "dropping the guard releases the connection slot immediately"]
pub struct InFlightGuard {
    state: Arc<RwLock<BackendState>>,
}

impl InFlightGuard {
    fn new(state: Arc<RwLock<BackendState>>) -> Self {
        state.write().connections += 1;
        Self { state }
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        let mut state = self.state.write();
        state.connections = state.connections.saturating_sub(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use axum::http::{Method, StatusCode};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// 可控的假转发实现
    struct StubRelay {
        fail: bool,
        calls: AtomicUsize,
        release: Option<Arc<Notify>>,
    }

    impl StubRelay {
        fn ok() -> Self {
            Self { fail: false, calls: AtomicUsize::new(0), release: None }
        }

        fn failing() -> Self {
            Self { fail: true, calls: AtomicUsize::new(0), release: None }
        }

        fn blocking(release: Arc<Notify>) -> Self {
            Self { fail: false, calls: AtomicUsize::new(0), release: Some(release) }
        }
    }

    #[async_trait]
    impl Relay for StubRelay {
        async fn forward(&self, _target: &Url, _request: ProxyRequest) -> Result<Response, RelayError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let Some(release) = &self.release {
                release.notified().await;
            }
            if self.fail {
                return Err(RelayError::Connect("connection refused".to_string()));
            }
            Ok(Response::new(Body::from("hello")))
        }
    }

    fn backend_with(relay: StubRelay) -> Arc<Backend> {
        Arc::new(Backend::new(
            Url::parse("http://localhost:3333").unwrap(),
            Arc::new(relay),
        ))
    }

    fn request() -> ProxyRequest {
        ProxyRequest::new(Method::GET, "/test")
    }

    #[test]
    fn test_backend_defaults() {
        let backend = backend_with(StubRelay::ok());
        assert!(backend.is_alive());
        assert_eq!(backend.active_connections(), 0);
        assert_eq!(backend.url().as_str(), "http://localhost:3333/");
    }

    #[test]
    fn test_set_alive_overwrites() {
        let backend = backend_with(StubRelay::ok());
        backend.set_alive(false);
        assert!(!backend.is_alive());
        backend.set_alive(false);
        assert!(!backend.is_alive());
        backend.set_alive(true);
        assert!(backend.is_alive());
    }

    #[test]
    fn test_guard_counts_and_releases() {
        let backend = backend_with(StubRelay::ok());
        let first = backend.acquire();
        let second = backend.acquire();
        assert_eq!(backend.active_connections(), 2);

        drop(first);
        assert_eq!(backend.active_connections(), 1);
        drop(second);
        assert_eq!(backend.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_relay_success_restores_count_after_body() {
        let backend = backend_with(StubRelay::ok());

        let response = backend.relay(request()).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        // 响应体尚未发送，连接仍在途
        assert_eq!(backend.active_connections(), 1);

        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&body[..], b"hello");
        assert_eq!(backend.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_relay_dropped_response_releases() {
        let backend = backend_with(StubRelay::ok());
        let response = backend.relay(request()).await.unwrap();
        drop(response);
        assert_eq!(backend.active_connections(), 0);
    }

    #[tokio::test]
    async fn test_relay_failure_restores_count() {
        let backend = backend_with(StubRelay::failing());
        let result = backend.relay(request()).await;
        assert!(result.is_err());
        assert_eq!(backend.active_connections(), 0);
        // 转发失败不会自行修改存活标记，由调度器决定
        assert!(backend.is_alive());
    }

    #[tokio::test]
    async fn test_relay_cancelled_restores_count() {
        let release = Arc::new(Notify::new());
        let backend = backend_with(StubRelay::blocking(release.clone()));

        let task = {
            let backend = backend.clone();
            tokio::spawn(async move { backend.relay(request()).await.map(|_| ()) })
        };

        // 等待转发进入阻塞点
        for _ in 0..100 {
            if backend.active_connections() == 1 {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        }
        assert_eq!(backend.active_connections(), 1);

        task.abort();
        let _ = task.await;
        assert_eq!(backend.active_connections(), 0);
    }
}
