use poolgate_core::ProxyRequest;

/// 携带重试标记的调度请求
///
/// 第一次失败后换一个后端重试一次，重试仍失败则直接返回错误。
#[derive(Debug, Clone)]
pub struct DispatchRequest {
    request: ProxyRequest,
    retry_attempted: bool,
}

impl DispatchRequest {
    pub fn new(request: ProxyRequest) -> Self {
        Self {
            request,
            retry_attempted: false,
        }
    }

    pub fn request(&self) -> &ProxyRequest {
        &self.request
    }

    pub fn retry_attempted(&self) -> bool {
        self.retry_attempted
    }

    /// 是否还能再重试
    pub fn allow_retry(&self) -> bool {
        !self.retry_attempted
    }

    /// 标记为重试请求
    pub fn into_retry(self) -> Self {
        Self {
            retry_attempted: true,
            ..self
        }
    }
}
