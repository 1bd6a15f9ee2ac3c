use crate::app::AppState;
use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde_json::json;

/// 池健康检查处理器
///
/// 至少一个后端存活时返回 200，否则 503；部分后端不可用时标记为 degraded。
pub async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let health = state.load_balancer.get_service_health();
    let status_code = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        status_code,
        Json(json!({
            "status": if health.is_healthy() { "ok" } else { "error" },
            "strategy": health.strategy,
            "healthy_backends": health.stats.healthy_backends,
            "total_backends": health.stats.total_backends,
            "health_ratio": health.stats.health_ratio,
            "degraded": health.is_healthy() && !health.stats.is_fully_healthy(),
        })),
    )
}

/// 各后端状态
pub async fn backend_status(State(state): State<AppState>) -> impl IntoResponse {
    Json(state.load_balancer.get_service_health())
}
