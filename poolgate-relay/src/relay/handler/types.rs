use axum::response::{IntoResponse, Response};
use axum::{http::StatusCode, Json};
use poolgate_core::RelayError;
use serde_json::json;
use thiserror::Error;

/// 错误类型枚举，用于确定HTTP状态码
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorType {
    /// 客户端错误 - 400 Bad Request
    BadRequest,
    /// 请求体过大 - 413 Payload Too Large
    PayloadTooLarge,
    /// 服务不可用 - 503 Service Unavailable
    ServiceUnavailable,
}

impl ErrorType {
    /// 获取对应的HTTP状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorType::BadRequest => StatusCode::BAD_REQUEST,
            ErrorType::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            ErrorType::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

/// 创建带有正确HTTP状态码的错误响应
pub fn create_error_response(
    error_type: ErrorType,
    message: &str,
    details: Option<String>,
) -> impl IntoResponse {
    let status_code = error_type.status_code();
    let error_json = json!({
        "error": {
            "message": message,
            "type": format!("{:?}", error_type),
            "status": status_code.as_u16(),
            "details": details,
        }
    });

    (status_code, Json(error_json))
}

/// 创建服务不可用错误响应
pub fn create_service_unavailable_response(
    message: &str,
    details: Option<String>,
) -> impl IntoResponse {
    create_error_response(ErrorType::ServiceUnavailable, message, details)
}

/// 请求调度失败的原因
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("没有可用的后端")]
    NoBackendAvailable,
    #[error("重试后端 {backend} 仍然失败: {source}")]
    RetryExhausted {
        backend: String,
        #[source]
        source: RelayError,
    },
    #[error("请求体超过 {limit} 字节上限")]
    BodyTooLarge { limit: usize },
    #[error("读取请求体失败: {0}")]
    BodyRead(String),
}

impl DispatchError {
    pub fn error_type(&self) -> ErrorType {
        match self {
            DispatchError::NoBackendAvailable | DispatchError::RetryExhausted { .. } => {
                ErrorType::ServiceUnavailable
            }
            DispatchError::BodyTooLarge { .. } => ErrorType::PayloadTooLarge,
            DispatchError::BodyRead(_) => ErrorType::BadRequest,
        }
    }
}

impl IntoResponse for DispatchError {
    fn into_response(self) -> Response {
        match self.error_type() {
            // 对客户端统一为 "Service not available"，细节只进日志和 details
            ErrorType::ServiceUnavailable => {
                create_service_unavailable_response("Service not available", Some(self.to_string()))
                    .into_response()
            }
            error_type => create_error_response(error_type, &self.to_string(), None).into_response(),
        }
    }
}
