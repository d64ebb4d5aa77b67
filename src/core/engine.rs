//! 同步引擎 - worker 池并发消费共享任务队列

use crate::config::SyncSettings;
use crate::core::comparator::{should_skip, ComparePolicy};
use crate::core::planner::SyncTask;
use crate::storage::RemoteStore;
use anyhow::Result;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::{debug, info, warn};

/// 引擎配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 并发 worker 数（最少 1）
    pub concurrency: usize,
    /// 比较策略
    pub compare_policy: ComparePolicy,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            compare_policy: ComparePolicy::default(),
        }
    }
}

impl SyncConfig {
    pub fn from_settings(settings: &SyncSettings) -> Self {
        Self {
            concurrency: settings.concurrency,
            compare_policy: settings.compare_policy(),
        }
    }
}

/// 同步报告，单次运行的聚合计数
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub processed: u64,
    pub uploaded: u64,
    pub skipped: u64,
    pub failed: u64,
    pub elapsed_ms: u64,
}

/// 运行期计数器
#[derive(Default)]
struct RunStats {
    processed: AtomicU64,
    uploaded: AtomicU64,
    skipped: AtomicU64,
    failed: AtomicU64,
}

/// 单个任务的终态
enum Outcome {
    Skipped,
    Uploaded,
}

/// 同步引擎
pub struct SyncEngine {
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new() -> Self {
        Self {
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(config: SyncConfig) -> Self {
        Self { config }
    }

    /// 执行同步：启动 worker 池轮询共享队列，直到任务耗尽。
    /// 单个任务的失败只计数，不中断其他 worker
    pub async fn run(&self, store: Arc<dyn RemoteStore>, tasks: Vec<SyncTask>) -> SyncReport {
        let started = Instant::now();
        let total = tasks.len();
        let workers = self.config.concurrency.max(1);
        let policy = self.config.compare_policy;

        info!(
            "开始同步: {} 个任务, 并发 {}, 目标 {}",
            total,
            workers,
            store.name()
        );

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let stats = Arc::new(RunStats::default());

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let stats = stats.clone();
            let store = store.clone();

            handles.push(tokio::spawn(async move {
                loop {
                    // 弹出下一个任务；锁只覆盖弹出本身
                    let task = { queue.lock().unwrap().pop_front() };
                    let Some(task) = task else { break };

                    match process_task(store.as_ref(), policy, &task).await {
                        Ok(Outcome::Skipped) => {
                            debug!("跳过: {}", task.remote_path);
                            stats.skipped.fetch_add(1, Ordering::Relaxed);
                        }
                        Ok(Outcome::Uploaded) => {
                            debug!("已上传: {}", task.remote_path);
                            stats.uploaded.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(e) => {
                            warn!("同步失败: {} - {}", task.remote_path, e);
                            stats.failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                    stats.processed.fetch_add(1, Ordering::Relaxed);
                }
                debug!("worker {} 退出", worker_id);
            }));
        }

        for handle in handles {
            let _ = handle.await;
        }

        let report = SyncReport {
            processed: stats.processed.load(Ordering::Relaxed),
            uploaded: stats.uploaded.load(Ordering::Relaxed),
            skipped: stats.skipped.load(Ordering::Relaxed),
            failed: stats.failed.load(Ordering::Relaxed),
            elapsed_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "同步完成: 处理 {}, 上传 {}, 跳过 {}, 失败 {} ({}ms)",
            report.processed, report.uploaded, report.skipped, report.failed, report.elapsed_ms
        );

        report
    }
}

impl Default for SyncEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// 处理单个任务：确保父目录、探测元数据、按策略跳过或上传
async fn process_task(
    store: &dyn RemoteStore,
    policy: ComparePolicy,
    task: &SyncTask,
) -> Result<Outcome> {
    // 父目录创建是尽力而为，结果不影响任务
    if let Some((dir, _)) = task.remote_path.rsplit_once('/') {
        if !dir.is_empty() {
            let _ = store.create_dir(dir).await;
        }
    }

    let meta = store.stat(&task.remote_path).await?;

    if should_skip(policy, task, meta.as_ref()).await? {
        return Ok(Outcome::Skipped);
    }

    store.upload(&task.local_path, &task.remote_path).await?;
    Ok(Outcome::Uploaded)
}
