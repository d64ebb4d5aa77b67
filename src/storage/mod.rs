pub mod dir_cache;
pub mod webdav;

use crate::error::TransportError;
use anyhow::Result;
use async_trait::async_trait;
use std::path::Path;

pub use dir_cache::DirCache;
pub use webdav::WebDavStore;

/// 远程对象元数据（每次探测临时产生，不持久化）
#[derive(Debug, Clone, Default)]
pub struct RemoteMeta {
    /// 对象字节数，响应没有长度头时为 None
    pub size: Option<u64>,
    /// 实体标签，已去除引号
    pub etag: Option<String>,
    /// 最后修改时间（原始字符串）
    pub last_modified: Option<String>,
}

/// 远程存储抽象接口
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// 创建远程目录。尽力而为：失败不报错、不影响后续操作
    async fn create_dir(&self, path: &str) -> Result<()>;

    /// 探测远程对象元数据；对象不存在返回 None
    async fn stat(&self, path: &str) -> Result<Option<RemoteMeta>, TransportError>;

    /// 上传本地文件到远程路径；remote 以 / 结尾时自动追加本地文件名
    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError>;

    /// 从 URL 拉取内容并上传到远程目录，返回最终远程路径
    async fn upload_from_url(
        &self,
        source_url: &str,
        remote_dir: &str,
    ) -> Result<String, TransportError>;

    /// 下载远程对象到本地文件（覆盖写入）
    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransportError>;

    /// 存储名称（用于日志）
    fn name(&self) -> &str;
}
