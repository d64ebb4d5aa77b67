//! WebDAV 远程存储实现
//!
//! 直接使用原生 HTTP 动词 (MKCOL/HEAD/PUT/GET)，带 Basic 认证、
//! 请求超时与重试策略；目录创建经过 [`DirCache`] 去重。

use super::{DirCache, RemoteMeta, RemoteStore};
use crate::config::{RemoteConfig, SyncSettings};
use crate::core::retry::RetryPolicy;
use crate::error::{is_retryable_status, TransportError};
use anyhow::Result;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use futures::StreamExt;
use regex::Regex;
use reqwest::header::{
    AUTHORIZATION, CONTENT_DISPOSITION, CONTENT_LENGTH, CONTENT_TYPE, ETAG, LAST_MODIFIED,
};
use reqwest::{Body, Client, Method, Response, StatusCode};
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};
use uuid::Uuid;

pub struct WebDavStore {
    client: Client,
    base_url: String,
    auth_header: String,
    timeout: Duration,
    retry: RetryPolicy,
    dirs: DirCache,
    mkcol: Method,
    name: String,
}

impl WebDavStore {
    pub fn new(remote: &RemoteConfig, settings: &SyncSettings) -> Result<Self> {
        let client = Client::builder().build()?;
        let auth_header = format!(
            "Basic {}",
            STANDARD.encode(format!("{}:{}", remote.user, remote.secret))
        );
        let base_url = remote.url.trim_end_matches('/').to_string();
        let name = format!("webdav://{}", base_url);

        Ok(Self {
            client,
            base_url,
            auth_header,
            timeout: Duration::from_millis(settings.request_timeout_ms),
            retry: RetryPolicy::new(
                settings.max_retries,
                Duration::from_millis(settings.retry_base_delay_ms),
            ),
            dirs: DirCache::new(),
            mkcol: Method::from_bytes(b"MKCOL")?,
            name,
        })
    }

    /// 规范化远程路径：去掉前导 /，逐段百分号转义后重新拼接
    fn normalize_path(path: &str) -> String {
        path.trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|seg| urlencoding::encode(seg).into_owned())
            .collect::<Vec<_>>()
            .join("/")
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, Self::normalize_path(path))
    }

    /// 单次 MKCOL，从不重试；201/301/405/409 都视为目录可用
    async fn mkcol_once(&self, url: &str) -> bool {
        match self
            .client
            .request(self.mkcol.clone(), url)
            .header(AUTHORIZATION, &self.auth_header)
            .timeout(self.timeout)
            .send()
            .await
        {
            Ok(resp) => {
                let status = resp.status();
                let ok = matches!(
                    status,
                    StatusCode::CREATED
                        | StatusCode::MOVED_PERMANENTLY
                        | StatusCode::METHOD_NOT_ALLOWED
                        | StatusCode::CONFLICT
                );
                if !ok {
                    debug!("MKCOL {} 返回 {}", url, status);
                }
                ok
            }
            Err(e) => {
                debug!("MKCOL {} 失败: {}", url, e);
                false
            }
        }
    }

    async fn stat_once(&self, url: &str) -> Result<Option<RemoteMeta>, TransportError> {
        let resp = self
            .client
            .head(url)
            .header(AUTHORIZATION, &self.auth_header)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            if is_retryable_status(status) {
                return Err(TransportError::from_status(status, "HEAD"));
            }
            // 非可重试的失败状态按对象不存在处理
            debug!("HEAD {} 返回 {}，按不存在处理", url, status);
            return Ok(None);
        }

        let headers = resp.headers();
        let size = headers
            .get(CONTENT_LENGTH)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<u64>().ok());
        let etag = headers
            .get(ETAG)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.trim_matches('"').to_string());
        let last_modified = headers
            .get(LAST_MODIFIED)
            .and_then(|v| v.to_str().ok())
            .map(|v| v.to_string());

        Ok(Some(RemoteMeta {
            size,
            etag,
            last_modified,
        }))
    }

    async fn upload_once(&self, url: &str, local: &Path) -> Result<(), TransportError> {
        // 每次尝试重新打开文件，保证重试时从头读取
        let file = tokio::fs::File::open(local).await?;
        let len = file.metadata().await?.len();
        let body = Body::wrap_stream(ReaderStream::new(file));

        let resp = self
            .client
            .put(url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_LENGTH, len)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout)
            .body(body)
            .send()
            .await?;

        let status = resp.status();
        if status.is_success() || status == StatusCode::CREATED || status == StatusCode::NO_CONTENT
        {
            Ok(())
        } else {
            Err(TransportError::from_status(status, "PUT"))
        }
    }

    async fn download_once(&self, url: &str, local: &Path) -> Result<(), TransportError> {
        let resp = self
            .client
            .get(url)
            .header(AUTHORIZATION, &self.auth_header)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::from_status(status, "GET"));
        }

        // 先创建/截断本地文件，再流式写入响应体
        let mut file = tokio::fs::File::create(local).await?;
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        Ok(())
    }

    async fn upload_from_url_once(
        &self,
        source_url: &str,
        remote_dir: &str,
    ) -> Result<String, TransportError> {
        // 拉取源 URL 时不携带认证头
        let resp = self
            .client
            .get(source_url)
            .timeout(self.timeout)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            return Err(TransportError::from_status(status, "源 URL"));
        }

        let filename = resolve_filename(&resp);
        let dir = remote_dir.trim_end_matches('/');
        let remote = if dir.is_empty() {
            filename
        } else {
            format!("{}/{}", dir, filename)
        };

        // 目标目录尽力创建
        if !dir.is_empty() {
            let _ = self.create_dir(dir).await;
        }

        let url = self.url_for(&remote);
        let len = resp.content_length();
        let mut req = self
            .client
            .put(url.as_str())
            .header(AUTHORIZATION, &self.auth_header)
            .header(CONTENT_TYPE, "application/octet-stream")
            .timeout(self.timeout);
        if let Some(len) = len {
            req = req.header(CONTENT_LENGTH, len);
        }

        let put_resp = req.body(Body::wrap_stream(resp.bytes_stream())).send().await?;

        let status = put_resp.status();
        if status.is_success() {
            info!("URL 上传完成: {} -> {}", source_url, remote);
            Ok(remote)
        } else {
            Err(TransportError::from_status(status, "PUT"))
        }
    }
}

#[async_trait]
impl RemoteStore for WebDavStore {
    async fn create_dir(&self, path: &str) -> Result<()> {
        let normalized = Self::normalize_path(path);
        if normalized.is_empty() {
            return Ok(());
        }
        let url = format!("{}/{}/", self.base_url, normalized);

        self.dirs.ensure(&normalized, || self.mkcol_once(&url)).await;

        Ok(())
    }

    async fn stat(&self, path: &str) -> Result<Option<RemoteMeta>, TransportError> {
        let url = self.url_for(path);
        self.retry.run("元数据探测", || self.stat_once(&url)).await
    }

    async fn upload(&self, local: &Path, remote: &str) -> Result<(), TransportError> {
        // remote 以 / 结尾时补上本地文件名
        let remote = if remote.ends_with('/') {
            let base = local.file_name().and_then(|n| n.to_str()).ok_or_else(|| {
                TransportError::Io(io::Error::new(
                    io::ErrorKind::InvalidInput,
                    "本地路径没有文件名",
                ))
            })?;
            format!("{}{}", remote, base)
        } else {
            remote.to_string()
        };
        let url = self.url_for(&remote);

        self.retry.run("上传", || self.upload_once(&url, local)).await
    }

    async fn upload_from_url(
        &self,
        source_url: &str,
        remote_dir: &str,
    ) -> Result<String, TransportError> {
        self.retry
            .run("URL 上传", || self.upload_from_url_once(source_url, remote_dir))
            .await
    }

    async fn download(&self, remote: &str, local: &Path) -> Result<(), TransportError> {
        let url = self.url_for(remote);
        self.retry.run("下载", || self.download_once(&url, local)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// 从响应推导文件名：RFC 6266 扩展参数 > 普通 filename 参数 >
/// URL 路径末段 > 生成名
fn resolve_filename(resp: &Response) -> String {
    if let Some(cd) = resp
        .headers()
        .get(CONTENT_DISPOSITION)
        .and_then(|v| v.to_str().ok())
    {
        if let Some(name) = filename_from_disposition(cd) {
            return name;
        }
    }

    if let Some(name) = resp
        .url()
        .path_segments()
        .and_then(|mut segments| segments.next_back())
        .filter(|s| !s.is_empty())
    {
        if let Ok(decoded) = urlencoding::decode(name) {
            return decoded.into_owned();
        }
        return name.to_string();
    }

    format!("download-{}", Uuid::new_v4())
}

/// 解析 Content-Disposition 中的文件名参数
fn filename_from_disposition(value: &str) -> Option<String> {
    // RFC 6266 扩展格式: filename*=UTF-8'lang'percent%20encoded
    if let Ok(re) = Regex::new(r"(?i)filename\*\s*=\s*[\w-]+'[\w-]*'([^;]+)") {
        if let Some(caps) = re.captures(value) {
            let raw = caps.get(1)?.as_str().trim().trim_matches('"');
            if let Ok(decoded) = urlencoding::decode(raw) {
                if !decoded.is_empty() {
                    return Some(decoded.into_owned());
                }
            }
        }
    }

    // 基本格式: filename="name.ext" 或 filename=name.ext
    if let Ok(re) = Regex::new(r#"(?i)filename\s*=\s*"?([^";]+)"?"#) {
        if let Some(caps) = re.captures(value) {
            let name = caps.get(1)?.as_str().trim();
            if !name.is_empty() {
                return Some(name.to_string());
            }
        }
    }

    None
}
