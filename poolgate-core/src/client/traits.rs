use super::types::{ProxyRequest, RelayError};
use async_trait::async_trait;
use axum::response::Response;
use reqwest::Url;

/// 上游转发能力
///
/// 负载均衡核心只通过这个接口把请求交给某个后端，
/// 具体的 HTTP 实现由 poolgate-relay 提供，测试中可以替换为假实现。
#[async_trait]
pub trait Relay: Send + Sync {
    /// 把请求转发到 `target` 并返回上游响应
    ///
    /// 只有传输层错误（连接失败、超时、读取中断）才返回 `Err`，
    /// 上游返回的 4xx/5xx 属于正常响应。
    async fn forward(&self, target: &Url, request: ProxyRequest) -> Result<Response, RelayError>;
}

/// 把后端基础地址和入站请求路径拼接成上游地址
///
/// 基础地址的路径作为前缀，两边的斜杠只保留一个；两边都有查询参数时用 `&` 连接。
pub fn join_target_url(base: &Url, path_and_query: &str) -> Result<Url, RelayError> {
    let (req_path, req_query) = match path_and_query.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (path_and_query, None),
    };

    let base_path = base.path();
    let path = match (base_path.ends_with('/'), req_path.starts_with('/')) {
        (true, true) => format!("{}{}", base_path, &req_path[1..]),
        (false, false) => format!("{}/{}", base_path, req_path),
        _ => format!("{}{}", base_path, req_path),
    };

    let query = match (base.query().filter(|q| !q.is_empty()), req_query.filter(|q| !q.is_empty())) {
        (Some(b), Some(r)) => Some(format!("{}&{}", b, r)),
        (Some(b), None) => Some(b.to_string()),
        (None, Some(r)) => Some(r.to_string()),
        (None, None) => None,
    };

    let mut target = base.clone();
    target.set_path(&path);
    target.set_query(query.as_deref());

    if target.cannot_be_a_base() {
        return Err(RelayError::InvalidTarget(target.to_string()));
    }

    Ok(target)
}
