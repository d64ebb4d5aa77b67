//! 远程目录创建去重
//!
//! 记录已确认存在的目录，并把并发的同路径创建请求合并为一次
//! 底层调用：后到的请求者等待首个请求者的结果，而不是各自发起。

use std::collections::{HashMap, HashSet};
use std::future::Future;
use tokio::sync::{watch, Mutex};
use tracing::debug;

#[derive(Default)]
struct DirCacheState {
    /// 已确认存在的目录（只增不减）
    created: HashSet<String>,
    /// 进行中的创建操作，完成后移除
    inflight: HashMap<String, watch::Receiver<bool>>,
}

/// 目录去重缓存，生命周期与单个传输实例一致
#[derive(Default)]
pub struct DirCache {
    state: Mutex<DirCacheState>,
}

/// 一次 ensure 调用在锁内决定的角色
enum Role {
    /// 目录已记录，无事可做
    Done,
    /// 等待进行中的创建
    Wait(watch::Receiver<bool>),
    /// 自己负责发起创建
    Create(watch::Sender<bool>),
}

impl DirCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// 确保路径的创建操作执行过。已记录则直接返回；有同路径操作
    /// 进行中则等待其完成；否则执行 create 并广播结果。
    /// create 返回 true 时该路径被记录为已存在
    pub async fn ensure<F, Fut>(&self, path: &str, create: F)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = bool>,
    {
        let role = {
            let mut state = self.state.lock().await;
            if state.created.contains(path) {
                Role::Done
            } else if let Some(rx) = state.inflight.get(path) {
                Role::Wait(rx.clone())
            } else {
                let (tx, rx) = watch::channel(false);
                state.inflight.insert(path.to_string(), rx);
                Role::Create(tx)
            }
        };

        match role {
            Role::Done => {}
            Role::Wait(mut rx) => {
                // 等待首个请求者的结果，无论成败都不再发起新调用
                let _ = rx.changed().await;
            }
            Role::Create(tx) => {
                let ok = create().await;
                let mut state = self.state.lock().await;
                state.inflight.remove(path);
                if ok {
                    state.created.insert(path.to_string());
                } else {
                    debug!("目录创建未确认: {}", path);
                }
                let _ = tx.send(ok);
            }
        }
    }

    /// 路径是否已记录为存在
    pub async fn contains(&self, path: &str) -> bool {
        self.state.lock().await.created.contains(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_concurrent_requests_collapse() {
        let cache = Arc::new(DirCache::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let cache = cache.clone();
            let calls = calls.clone();
            handles.push(tokio::spawn(async move {
                cache
                    .ensure("backup/sub", || async move {
                        calls.fetch_add(1, Ordering::SeqCst);
                        // 放大竞争窗口
                        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                        true
                    })
                    .await;
            }));
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(cache.contains("backup/sub").await);
    }

    #[tokio::test]
    async fn test_distinct_paths_each_created() {
        let cache = DirCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        for path in ["a", "a/b", "c"] {
            cache
                .ensure(path, || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_memoized_path_not_recreated() {
        let cache = DirCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        for _ in 0..3 {
            cache
                .ensure("docs", || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    true
                })
                .await;
        }

        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_create_not_memoized() {
        let cache = DirCache::new();
        let calls = AtomicUsize::new(0);
        let calls = &calls;

        cache
            .ensure("broken", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                false
            })
            .await;
        assert!(!cache.contains("broken").await);

        // 失败后新的（非并发）请求可以再次尝试
        cache
            .ensure("broken", || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                true
            })
            .await;

        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert!(cache.contains("broken").await);
    }
}
