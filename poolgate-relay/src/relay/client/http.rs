use async_trait::async_trait;
use axum::body::Body;
use axum::http::header::{self, HeaderMap, HeaderName, HeaderValue};
use axum::response::Response;
use poolgate_core::{join_target_url, GlobalSettings, ProxyRequest, Relay, RelayError};
use reqwest::{Client, Url};
use std::time::Duration;

/// 逐跳头部，不在代理两侧之间传递
const HOP_BY_HOP_HEADERS: &[&str] = &[
    "connection",
    "proxy-connection",
    "keep-alive",
    "proxy-authenticate",
    "proxy-authorization",
    "te",
    "trailer",
    "transfer-encoding",
    "upgrade",
];

static X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");
static X_FORWARDED_HOST: HeaderName = HeaderName::from_static("x-forwarded-host");
static X_FORWARDED_PROTO: HeaderName = HeaderName::from_static("x-forwarded-proto");

/// 基于 reqwest 的 HTTP 转发实现
///
/// 只设置连接超时，不限制总请求时间；不跟随重定向，3xx 原样返回给客户端。
/// 直连后端，忽略环境变量中的代理设置。
#[derive(Clone)]
pub struct HttpRelay {
    client: Client,
}

impl HttpRelay {
    pub fn new(connect_timeout: Duration) -> Result<Self, RelayError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self { client })
    }

    pub fn from_settings(settings: &GlobalSettings) -> Result<Self, RelayError> {
        Self::new(settings.connect_timeout())
    }
}

#[async_trait]
impl Relay for HttpRelay {
    async fn forward(&self, target: &Url, request: ProxyRequest) -> Result<Response, RelayError> {
        let url = join_target_url(target, &request.path_and_query)?;
        let headers = build_upstream_headers(&request);

        tracing::debug!("Forwarding {} to {}", request.method, url);

        let upstream = self
            .client
            .request(request.method, url)
            .headers(headers)
            .body(request.body)
            .send()
            .await
            .map_err(classify_error)?;

        Ok(build_downstream_response(upstream))
    }
}

fn classify_error(error: reqwest::Error) -> RelayError {
    if error.is_timeout() {
        RelayError::Timeout
    } else if error.is_connect() {
        RelayError::Connect(error.to_string())
    } else {
        RelayError::RequestError(error)
    }
}

fn strip_hop_by_hop(headers: &mut HeaderMap) {
    // Connection 头里列出的字段同样是逐跳的
    let listed: Vec<HeaderName> = headers
        .get_all(header::CONNECTION)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }
    for name in HOP_BY_HOP_HEADERS {
        headers.remove(*name);
    }
}

/// 构建发往上游的请求头
fn build_upstream_headers(request: &ProxyRequest) -> HeaderMap {
    let mut headers = request.headers.clone();
    strip_hop_by_hop(&mut headers);

    // Host 和长度由 reqwest 按目标地址和请求体重新生成
    let original_host = headers.remove(header::HOST);
    headers.remove(header::CONTENT_LENGTH);

    if let Some(addr) = request.client_addr {
        let client_ip = addr.ip().to_string();
        let forwarded_for = match headers
            .get(&X_FORWARDED_FOR)
            .and_then(|value| value.to_str().ok())
        {
            Some(prior) if !prior.is_empty() => format!("{}, {}", prior, client_ip),
            _ => client_ip,
        };
        if let Ok(value) = HeaderValue::from_str(&forwarded_for) {
            headers.insert(X_FORWARDED_FOR.clone(), value);
        }
    }

    if let Some(host) = original_host {
        if !headers.contains_key(&X_FORWARDED_HOST) {
            headers.insert(X_FORWARDED_HOST.clone(), host);
        }
    }

    if !headers.contains_key(&X_FORWARDED_PROTO) {
        headers.insert(X_FORWARDED_PROTO.clone(), HeaderValue::from_static("http"));
    }

    headers
}

/// 把上游响应转换为下游响应，响应体以流的形式透传
fn build_downstream_response(upstream: reqwest::Response) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
