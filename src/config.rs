//! 配置模块 - 远程凭据解析与同步运行参数

use crate::core::comparator::ComparePolicy;
use crate::secret::{reveal, DEFAULT_OBSCURE_KEY};
use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::Path;
use tracing::warn;

/// 远程存储配置。解析完成后不可变，secret 为解混淆后的明文
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    pub url: String,
    pub user: String,
    pub secret: String,
    /// 配置中的可选 type 字段
    pub kind: Option<String>,
}

/// 远程配置解析器，持有解混淆密钥
pub struct RemoteResolver {
    key: Vec<u8>,
}

impl RemoteResolver {
    /// 使用内置默认密钥
    pub fn new() -> Self {
        Self {
            key: DEFAULT_OBSCURE_KEY.to_vec(),
        }
    }

    /// 使用外部注入的密钥（16 或 32 字节）
    pub fn with_key(key: Vec<u8>) -> Self {
        Self { key }
    }

    /// 从配置文本解析指定远程段。段缺失、文档无法解析或必需键
    /// （url/user/pass）缺失时返回 None
    pub fn resolve(&self, config_text: &str, remote_name: &str) -> Option<RemoteConfig> {
        let section = parse_section(config_text, remote_name)?;
        let url = section.get("url")?.clone();
        let user = section.get("user")?.clone();
        let pass = section.get("pass")?;

        let revealed = reveal(pass, &self.key);
        if revealed.is_fallback() {
            warn!("远程 {} 的密码解混淆失败，按原文使用", remote_name);
        }

        Some(RemoteConfig {
            url,
            user,
            secret: revealed.into_secret(),
            kind: section.get("type").cloned(),
        })
    }

    /// 从配置文件加载远程段。文件不可读或段缺失是致命错误，
    /// 调用方应终止本次运行
    pub fn load_remote(&self, path: &Path, remote_name: &str) -> Result<RemoteConfig> {
        let text = fs::read_to_string(path)
            .with_context(|| format!("无法读取配置文件 {:?}", path))?;
        self.resolve(&text, remote_name)
            .ok_or_else(|| anyhow!("配置文件中没有远程段 [{}]", remote_name))
    }
}

impl Default for RemoteResolver {
    fn default() -> Self {
        Self::new()
    }
}

/// 解析分段 key=value 文档，返回指定段的键值表
fn parse_section(text: &str, name: &str) -> Option<HashMap<String, String>> {
    let mut sections: HashMap<String, HashMap<String, String>> = HashMap::new();
    let mut current: Option<String> = None;

    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') {
            let section = line.strip_prefix('[')?.strip_suffix(']')?.trim().to_string();
            sections.entry(section.clone()).or_default();
            current = Some(section);
            continue;
        }
        if let Some((k, v)) = line.split_once('=') {
            // 段外的键值忽略
            if let Some(ref cur) = current {
                sections
                    .get_mut(cur)?
                    .insert(k.trim().to_string(), v.trim().to_string());
            }
            continue;
        }
        // 既不是段头也不是键值，整个文档视为无法解析
        return None;
    }

    sections.remove(name)
}

/// 同步运行参数
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    /// 单次请求超时（毫秒）
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
    /// 最大额外重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 重试基础延迟（毫秒），按次数线性递增
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    /// 比较策略: "size" 或 "size+etag"
    #[serde(default = "default_compare_policy")]
    pub compare_policy: String,
    /// 并发 worker 数
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_request_timeout_ms() -> u64 {
    30000
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    600
}

fn default_compare_policy() -> String {
    "size+etag".to_string()
}

fn default_concurrency() -> usize {
    4
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            max_retries: default_max_retries(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            compare_policy: default_compare_policy(),
            concurrency: default_concurrency(),
        }
    }
}

impl SyncSettings {
    /// 从配置文件加载同步参数
    pub fn load(config_dir: &Path) -> Self {
        let config_file = config_dir.join("config.json");
        if config_file.exists() {
            if let Ok(content) = fs::read_to_string(&config_file) {
                if let Ok(config) = serde_json::from_str::<serde_json::Value>(&content) {
                    if let Some(section) = config.get("sync") {
                        if let Ok(settings) = serde_json::from_value::<SyncSettings>(section.clone()) {
                            return settings;
                        }
                    }
                }
            }
        }
        Self::default()
    }

    /// 保存同步参数
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        let config_file = config_dir.join("config.json");

        // 读取现有配置
        let mut config: serde_json::Value = if config_file.exists() {
            let content = fs::read_to_string(&config_file)?;
            serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
        } else {
            serde_json::json!({})
        };

        // 更新同步参数
        config["sync"] = serde_json::to_value(self).unwrap();

        fs::write(&config_file, serde_json::to_string_pretty(&config).unwrap())
    }

    /// 将配置的比较策略字符串映射为枚举
    pub fn compare_policy(&self) -> ComparePolicy {
        ComparePolicy::parse(&self.compare_policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::secret::obscure;

    const SAMPLE: &str = r#"
# 备份远程
[backup]
url = https://dav.example.com/files
user = alice
pass = plain-secret
type = webdav

[other]
url = https://other.example.com
user = bob
pass = x
"#;

    #[test]
    fn test_resolve_section() {
        let resolver = RemoteResolver::new();
        let config = resolver.resolve(SAMPLE, "backup").unwrap();
        assert_eq!(config.url, "https://dav.example.com/files");
        assert_eq!(config.user, "alice");
        // 未混淆的密码按原文回退
        assert_eq!(config.secret, "plain-secret");
        assert_eq!(config.kind.as_deref(), Some("webdav"));
    }

    #[test]
    fn test_resolve_obscured_pass() {
        let obscured = obscure("real-password", &DEFAULT_OBSCURE_KEY).unwrap();
        let text = format!("[r]\nurl = https://x\nuser = u\npass = {}\n", obscured);
        let config = RemoteResolver::new().resolve(&text, "r").unwrap();
        assert_eq!(config.secret, "real-password");
    }

    #[test]
    fn test_missing_section() {
        assert!(RemoteResolver::new().resolve(SAMPLE, "nope").is_none());
    }

    #[test]
    fn test_missing_required_key() {
        let text = "[r]\nurl = https://x\nuser = u\n";
        assert!(RemoteResolver::new().resolve(text, "r").is_none());
    }

    #[test]
    fn test_unparsable_document() {
        let text = "[r]\nurl = https://x\ngarbage line\n";
        assert!(RemoteResolver::new().resolve(text, "r").is_none());
    }

    #[test]
    fn test_kind_optional() {
        let config = RemoteResolver::new().resolve(SAMPLE, "other").unwrap();
        assert!(config.kind.is_none());
    }

    #[test]
    fn test_settings_defaults() {
        let settings = SyncSettings::default();
        assert_eq!(settings.request_timeout_ms, 30000);
        assert_eq!(settings.max_retries, 2);
        assert_eq!(settings.retry_base_delay_ms, 600);
        assert_eq!(settings.concurrency, 4);
        assert_eq!(settings.compare_policy(), ComparePolicy::SizeEtag);
    }

    #[test]
    fn test_settings_load_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        let settings = SyncSettings::load(dir.path());
        assert_eq!(settings.concurrency, 4);
    }

    #[test]
    fn test_settings_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut settings = SyncSettings::default();
        settings.concurrency = 8;
        settings.compare_policy = "size".to_string();
        settings.save(dir.path()).unwrap();

        let loaded = SyncSettings::load(dir.path());
        assert_eq!(loaded.concurrency, 8);
        assert_eq!(loaded.compare_policy(), ComparePolicy::Size);
    }
}
