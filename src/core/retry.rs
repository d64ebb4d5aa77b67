//! 重试策略 - 统一应用于各网络操作

use crate::error::TransportError;
use std::future::Future;
use std::time::Duration;
use tracing::{error, warn};

/// 显式重试策略：最大额外尝试次数加线性退避
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// 首次失败后允许的额外尝试次数
    pub max_retries: u32,
    /// 基础延迟，第 n 次失败后等待 base_delay * (n + 1)
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 2,
            base_delay: Duration::from_millis(600),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// 第 attempt 次失败后的等待时长
    pub fn delay(&self, attempt: u32) -> Duration {
        self.base_delay * (attempt + 1)
    }

    /// 执行操作。瞬时错误按策略重试，其余错误立即返回；
    /// 重试耗尽后返回最后一次的错误
    pub async fn run<T, F, Fut>(&self, op: &str, mut action: F) -> Result<T, TransportError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, TransportError>>,
    {
        let mut attempt = 0u32;
        loop {
            match action().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    let delay = self.delay(attempt);
                    warn!(
                        "{} 失败，{}ms 后重试 ({}/{}): {}",
                        op,
                        delay.as_millis(),
                        attempt + 1,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_retryable() {
                        error!("{} 最终失败 (已重试{}次): {}", op, self.max_retries, e);
                    }
                    return Err(e);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> TransportError {
        TransportError::from_status(StatusCode::SERVICE_UNAVAILABLE, "test")
    }

    fn permanent() -> TransportError {
        TransportError::from_status(StatusCode::FORBIDDEN, "test")
    }

    fn fast_policy(max_retries: u32) -> RetryPolicy {
        RetryPolicy::new(max_retries, Duration::from_millis(1))
    }

    #[tokio::test]
    async fn test_retry_bound() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(2)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(transient()) }
            })
            .await;

        assert!(result.is_err());
        // 首次尝试加 max_retries 次重试
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_permanent_error_no_retry() {
        let calls = AtomicU32::new(0);
        let result: Result<(), _> = fast_policy(5)
            .run("op", || {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(permanent()) }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        // 首次 503，重试后成功：共两次调用
        let calls = AtomicU32::new(0);
        let result = fast_policy(2)
            .run("op", || {
                let n = calls.fetch_add(1, Ordering::SeqCst);
                async move {
                    if n == 0 {
                        Err(transient())
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_linear_delay() {
        let policy = RetryPolicy::new(3, Duration::from_millis(600));
        assert_eq!(policy.delay(0), Duration::from_millis(600));
        assert_eq!(policy.delay(1), Duration::from_millis(1200));
        assert_eq!(policy.delay(2), Duration::from_millis(1800));
    }
}
