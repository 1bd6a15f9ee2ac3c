use axum::http::{HeaderMap, Method};
use bytes::Bytes;
use std::net::SocketAddr;
use thiserror::Error;

// 定义转发错误类型
#[derive(Error, Debug)]
pub enum RelayError {
    #[error("无法构建上游地址: {0}")]
    InvalidTarget(String),
    #[error("上游连接失败: {0}")]
    Connect(String),
    #[error("上游请求超时")]
    Timeout,
    #[error("HTTP请求失败: {0}")]
    RequestError(#[from] reqwest::Error),
}

impl RelayError {
    /// 是否为连接阶段的错误
    pub fn is_connect(&self) -> bool {
        match self {
            RelayError::Connect(_) => true,
            RelayError::RequestError(e) => e.is_connect(),
            _ => false,
        }
    }
}

/// 待转发的入站请求
///
/// 请求体在入站时整体缓冲，重试时可以原样重发。
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub path_and_query: String,
    pub headers: HeaderMap,
    pub body: Bytes,
    pub client_addr: Option<SocketAddr>,
}

impl ProxyRequest {
    pub fn new(method: Method, path_and_query: impl Into<String>) -> Self {
        Self {
            method,
            path_and_query: path_and_query.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
            client_addr: None,
        }
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        self.headers = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn with_client_addr(mut self, addr: Option<SocketAddr>) -> Self {
        self.client_addr = addr;
        self
    }

    /// 不含查询参数的路径
    pub fn path(&self) -> &str {
        self.path_and_query
            .split_once('?')
            .map(|(path, _)| path)
            .unwrap_or(&self.path_and_query)
    }
}
