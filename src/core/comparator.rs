//! 比较策略 - 判定本地文件是否已与远程一致

use crate::core::planner::SyncTask;
use crate::storage::RemoteMeta;
use anyhow::Result;
use tracing::debug;

/// 比较策略
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComparePolicy {
    /// 仅比较大小
    Size,
    /// 大小一致后再比较远程 ETag 与本地内容摘要
    SizeEtag,
}

impl ComparePolicy {
    /// 解析配置字符串（"size" / "size+etag"），无法识别时取默认值
    pub fn parse(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "size" => ComparePolicy::Size,
            "size+etag" => ComparePolicy::SizeEtag,
            _ => ComparePolicy::SizeEtag,
        }
    }
}

impl Default for ComparePolicy {
    fn default() -> Self {
        ComparePolicy::SizeEtag
    }
}

/// 计算内容摘要（BLAKE3 十六进制）
pub fn content_hash(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}

/// 判定任务是否可跳过。远程没有元数据时一律上传；SizeEtag 策略
/// 只在远程有 ETag 时才读取本地文件计算摘要，避免不必要的本地 IO
pub async fn should_skip(
    policy: ComparePolicy,
    task: &SyncTask,
    meta: Option<&RemoteMeta>,
) -> Result<bool> {
    let Some(meta) = meta else {
        return Ok(false);
    };

    match policy {
        ComparePolicy::Size => Ok(meta.size == Some(task.size)),
        ComparePolicy::SizeEtag => {
            if meta.size != Some(task.size) {
                return Ok(false);
            }
            let Some(etag) = meta.etag.as_deref() else {
                // 没有 ETag 无法确认内容一致，不跳过
                return Ok(false);
            };

            let data = tokio::fs::read(&task.local_path).await?;
            let digest = content_hash(&data);
            let matched = etag.eq_ignore_ascii_case(&digest);
            if !matched {
                debug!(
                    "ETag 不匹配: {} (remote={}, local={})",
                    task.remote_path, etag, digest
                );
            }
            Ok(matched)
        }
    }
}
