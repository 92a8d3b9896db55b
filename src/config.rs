//! 应用配置模块

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// 重试配置（仅作用于瞬时 I/O 错误）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryConfig {
    /// 总尝试次数（含首次）
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    /// 每次重试前的固定延迟（毫秒）
    #[serde(default = "default_retry_delay_ms")]
    pub delay_ms: u64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_ms() -> u64 {
    1000
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            delay_ms: default_retry_delay_ms(),
        }
    }
}

impl RetryConfig {
    /// 无延迟的快速重试，测试用
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay_ms: 0,
        }
    }

    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

/// 文件比较配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompareConfig {
    /// 小于此大小的文件用哈希比较，否则逐块比较
    #[serde(default = "default_hash_threshold")]
    pub hash_threshold: u64,
    /// 逐块比较的块大小
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,
}

fn default_hash_threshold() -> u64 {
    1024 * 1024 // 1MB
}

fn default_chunk_size() -> u64 {
    8 * 1024 // 8KB
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            hash_threshold: default_hash_threshold(),
            chunk_size: default_chunk_size(),
        }
    }
}

/// 文件夹匹配配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MatchConfig {
    /// 创建时间差在此范围内视为"同时创建"（秒）
    #[serde(default = "default_creation_tolerance_secs")]
    pub creation_tolerance_secs: i64,
    /// 允许的直接文件数量差
    #[serde(default = "default_file_count_tolerance")]
    pub file_count_tolerance: usize,
}

fn default_creation_tolerance_secs() -> i64 {
    300
}

fn default_file_count_tolerance() -> usize {
    2
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            creation_tolerance_secs: default_creation_tolerance_secs(),
            file_count_tolerance: default_file_count_tolerance(),
        }
    }
}

/// 镜像同步配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MirrorConfig {
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub compare: CompareConfig,
    #[serde(default, rename = "match")]
    pub matching: MatchConfig,
    /// 每处理多少个文件输出一次进度
    #[serde(default = "default_progress_every")]
    pub progress_every: usize,
}

fn default_progress_every() -> usize {
    100
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            retry: RetryConfig::default(),
            compare: CompareConfig::default(),
            matching: MatchConfig::default(),
            progress_every: default_progress_every(),
        }
    }
}

impl MirrorConfig {
    /// 从配置文件加载同步配置
    pub fn load(config_dir: &Path) -> Self {
        read_section(config_dir, "sync").unwrap_or_default()
    }

    /// 保存同步配置
    pub fn save(&self, config_dir: &Path) -> io::Result<()> {
        write_section(config_dir, "sync", self)
    }
}

/// 默认配置目录
pub fn default_config_dir() -> PathBuf {
    crate::dirs::config_dir()
        .map(|p| p.join("dirmirror"))
        .unwrap_or_else(|| PathBuf::from(".dirmirror"))
}

/// 读取 config.json 中的某个键，文件缺失或格式错误时返回 None
pub(crate) fn read_section<T: serde::de::DeserializeOwned>(
    config_dir: &Path,
    key: &str,
) -> Option<T> {
    let content = fs::read_to_string(config_dir.join("config.json")).ok()?;
    let config = serde_json::from_str::<serde_json::Value>(&content).ok()?;
    let section = config.get(key)?;
    match serde_json::from_value::<T>(section.clone()) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!("配置项 {} 格式错误，使用默认值: {}", key, e);
            None
        }
    }
}

/// 把某个键合并写回 config.json，保留其他键
pub(crate) fn write_section<T: Serialize>(config_dir: &Path, key: &str, value: &T) -> io::Result<()> {
    fs::create_dir_all(config_dir)?;
    let config_file = config_dir.join("config.json");

    // 读取现有配置
    let mut config: serde_json::Value = if config_file.exists() {
        let content = fs::read_to_string(&config_file)?;
        serde_json::from_str(&content).unwrap_or_else(|_| serde_json::json!({}))
    } else {
        serde_json::json!({})
    };
    if !config.is_object() {
        config = serde_json::json!({});
    }

    config[key] = serde_json::to_value(value).map_err(io::Error::other)?;

    let content = serde_json::to_string_pretty(&config).map_err(io::Error::other)?;
    fs::write(&config_file, content)
}
