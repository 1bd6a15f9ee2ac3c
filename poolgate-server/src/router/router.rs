use crate::app::AppState;
use axum::{
    Router,
    extract::{Request, State},
    response::Response,
    routing::get,
};
use tower_http::trace::TraceLayer;

use super::health::{backend_status, health_check};

/// 创建代理路由，所有请求都交给负载均衡处理器
pub fn create_proxy_router() -> Router<AppState> {
    Router::new()
        .fallback(proxy)
        .layer(TraceLayer::new_for_http())
}

/// 创建管理路由
pub fn create_admin_router() -> Router<AppState> {
    Router::new()
        .route("/", get(index))
        .route("/health", get(health_check))
        .route("/backends", get(backend_status))
        .layer(TraceLayer::new_for_http())
}

/// 代理处理器
pub async fn proxy(State(state): State<AppState>, request: Request) -> Response {
    state.handler.handle(request).await
}

/// 首页处理器
pub async fn index() -> &'static str {
    "Poolgate - HTTP Load Balancer"
}
