//! 同步任务规划 - 枚举本地目录生成任务列表

use anyhow::Result;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

/// 单个同步任务。规划时创建，之后不可变
#[derive(Debug, Clone)]
pub struct SyncTask {
    pub local_path: PathBuf,
    /// 相对 remote_root 的远程路径，统一正斜杠
    pub remote_path: String,
    pub size: u64,
}

/// 递归枚举 local_root 下的常规文件，生成任务列表。
/// 远程路径为 remote_root 拼接相对路径；列表顺序即遍历顺序，
/// 不提供稳定性保证
pub async fn plan(local_root: &Path, remote_root: &str) -> Result<Vec<SyncTask>> {
    let root = local_root.to_path_buf();
    let remote_root = remote_root.trim_end_matches('/').to_string();

    // 遍历放在阻塞线程池，避免占住 async runtime
    let tasks = tokio::task::spawn_blocking(move || {
        let mut tasks = Vec::new();

        for entry in WalkDir::new(&root).follow_links(false) {
            let entry = match entry {
                Ok(e) => e,
                Err(e) => {
                    debug!("跳过不可读条目: {}", e);
                    continue;
                }
            };
            // 只同步常规文件
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = match entry.metadata() {
                Ok(m) => m,
                Err(e) => {
                    debug!("跳过无法读取元数据的文件: {}", e);
                    continue;
                }
            };
            let relative = match entry.path().strip_prefix(&root) {
                Ok(r) => r,
                Err(_) => continue,
            };
            let Some(relative) = relative.to_str() else {
                debug!("跳过非 UTF-8 路径: {:?}", relative);
                continue;
            };

            let relative = relative.replace('\\', "/");
            let remote_path = if remote_root.is_empty() {
                relative
            } else {
                format!("{}/{}", remote_root, relative)
            };

            tasks.push(SyncTask {
                local_path: entry.path().to_path_buf(),
                remote_path,
                size: metadata.len(),
            });
        }

        tasks
    })
    .await?;

    debug!("规划完成: {} 个任务", tasks.len());
    Ok(tasks)
}
