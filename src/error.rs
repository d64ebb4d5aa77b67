//! 传输错误类型 - 区分可重试与不可重试的失败

use reqwest::StatusCode;
use thiserror::Error;

/// 远程传输错误
#[derive(Debug, Error)]
pub enum TransportError {
    /// 瞬时远程错误（超时类或服务端错误状态码），可按策略重试
    #[error("远程瞬时错误 ({status}): {context}")]
    Transient { status: StatusCode, context: String },

    /// 永久远程错误（如 401/403），立即失败
    #[error("远程错误 ({status}): {context}")]
    Permanent { status: StatusCode, context: String },

    /// 网络层错误（连接失败、请求超时等）
    #[error("网络错误: {0}")]
    Network(#[from] reqwest::Error),

    /// 本地文件 IO 错误
    #[error("本地 IO 错误: {0}")]
    Io(#[from] std::io::Error),
}

impl TransportError {
    /// 按状态码分类：可重试范围内的归为瞬时错误
    pub fn from_status(status: StatusCode, context: impl Into<String>) -> Self {
        let context = context.into();
        if is_retryable_status(status) {
            TransportError::Transient { status, context }
        } else {
            TransportError::Permanent { status, context }
        }
    }

    /// 是否允许自动重试
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Transient { .. } => true,
            TransportError::Network(e) => e.is_timeout(),
            _ => false,
        }
    }
}

/// 可重试状态码：408/425/429 以及所有 5xx
pub fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_EARLY
        || status == StatusCode::TOO_MANY_REQUESTS
        || status.is_server_error()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_status() {
        assert!(is_retryable_status(StatusCode::REQUEST_TIMEOUT));
        assert!(is_retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(is_retryable_status(StatusCode::INTERNAL_SERVER_ERROR));
        assert!(!is_retryable_status(StatusCode::UNAUTHORIZED));
        assert!(!is_retryable_status(StatusCode::FORBIDDEN));
        assert!(!is_retryable_status(StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_from_status_classification() {
        let e = TransportError::from_status(StatusCode::BAD_GATEWAY, "PUT");
        assert!(e.is_retryable());

        let e = TransportError::from_status(StatusCode::FORBIDDEN, "PUT");
        assert!(!e.is_retryable());
    }
}
