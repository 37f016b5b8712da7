// 配置管理模块

use crate::error::{UploadError, UploadResult};
use crate::uploader::retry::{
    RetryPolicy, DEFAULT_MAX_RETRIES, INITIAL_BACKOFF_MS, MAX_BACKOFF_MS, RATE_LIMIT_BACKOFF_MS,
};
use crate::uploader::{DEFAULT_BATCH_SIZE, DEFAULT_CHUNK_SIZE};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 上传配置
    #[serde(default)]
    pub upload: UploadConfig,
    /// 远端节点配置
    #[serde(default)]
    pub endpoint: EndpointConfig,
    /// 🔥 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 50MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    50 * 1024 * 1024 // 50MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 上传配置
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadConfig {
    /// 同时进行中的最大分片数
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    /// 分片大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
    /// 瞬时错误最大重试次数
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// 初始退避延迟（毫秒）
    #[serde(default = "default_initial_backoff_ms")]
    pub initial_backoff_ms: u64,
    /// 最大退避延迟（毫秒）
    #[serde(default = "default_max_backoff_ms")]
    pub max_backoff_ms: u64,
    /// 限流时的最小等待时间（毫秒）
    #[serde(default = "default_rate_limit_backoff_ms")]
    pub rate_limit_backoff_ms: u64,
    /// 不可重试错误的尝试次数（默认 1，不再尝试）
    #[serde(default = "default_non_transient_attempts")]
    pub non_transient_attempts: u32,
    /// 续传时校验数据源内容摘要
    #[serde(default = "default_verify_content")]
    pub verify_content: bool,
    /// 上传文件夹时是否跳过隐藏文件（以.开头的文件/文件夹）
    #[serde(default)]
    pub skip_hidden_files: bool,
}

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_chunk_size() -> u32 {
    DEFAULT_CHUNK_SIZE
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_initial_backoff_ms() -> u64 {
    INITIAL_BACKOFF_MS
}

fn default_max_backoff_ms() -> u64 {
    MAX_BACKOFF_MS
}

fn default_rate_limit_backoff_ms() -> u64 {
    RATE_LIMIT_BACKOFF_MS
}

fn default_non_transient_attempts() -> u32 {
    1
}

fn default_verify_content() -> bool {
    true
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            chunk_size: default_chunk_size(),
            max_retries: default_max_retries(),
            initial_backoff_ms: default_initial_backoff_ms(),
            max_backoff_ms: default_max_backoff_ms(),
            rate_limit_backoff_ms: default_rate_limit_backoff_ms(),
            non_transient_attempts: default_non_transient_attempts(),
            verify_content: default_verify_content(),
            skip_hidden_files: false,
        }
    }
}

impl UploadConfig {
    /// 校验配置
    pub fn validate(&self) -> UploadResult<()> {
        if self.batch_size == 0 {
            return Err(UploadError::config("batch_size 必须大于 0"));
        }
        if self.chunk_size == 0 {
            return Err(UploadError::config("chunk_size 必须大于 0"));
        }
        if self.initial_backoff_ms == 0 {
            return Err(UploadError::config("initial_backoff_ms 必须大于 0"));
        }
        if self.max_backoff_ms < self.initial_backoff_ms {
            return Err(UploadError::config(format!(
                "max_backoff_ms ({}) 不能小于 initial_backoff_ms ({})",
                self.max_backoff_ms, self.initial_backoff_ms
            )));
        }
        Ok(())
    }

    /// 重试策略
    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_retries: self.max_retries,
            initial_backoff_ms: self.initial_backoff_ms,
            max_backoff_ms: self.max_backoff_ms,
            rate_limit_backoff_ms: self.rate_limit_backoff_ms,
            non_transient_attempts: self.non_transient_attempts,
        }
    }
}

/// 远端节点配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    /// 节点地址
    #[serde(default = "default_endpoint_url")]
    pub url: String,
    /// 币种
    #[serde(default = "default_currency")]
    pub currency: String,
    /// 单个请求超时（秒）
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
    /// 签名密钥
    #[serde(default)]
    pub key: String,
}

fn default_endpoint_url() -> String {
    "http://node1.example.net".to_string()
}

fn default_currency() -> String {
    "arweave".to_string()
}

fn default_request_timeout_secs() -> u64 {
    30
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            url: default_endpoint_url(),
            currency: default_currency(),
            request_timeout_secs: default_request_timeout_secs(),
            key: String::new(),
        }
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .upload
            .validate()
            .context("配置文件中的上传配置验证失败")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.upload
            .validate()
            .context("保存配置失败：上传配置无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path.display());
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path.display());
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();
                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }
                default_config
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.upload.batch_size, 5);
        assert_eq!(config.upload.chunk_size, 25_000_000);
        assert_eq!(config.upload.max_retries, 3);
        assert!(config.upload.verify_content);
        assert_eq!(config.endpoint.currency, "arweave");
        assert!(config.upload.validate().is_ok());
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_file = NamedTempFile::new().unwrap();
        let path = temp_file.path();

        let mut config = AppConfig::default();
        config.upload.batch_size = 8;
        config.endpoint.url = "https://upload.example.org".to_string();
        config.save_to_file(path).await.unwrap();

        let loaded = AppConfig::load_from_file(path).await.unwrap();
        assert_eq!(loaded.upload, config.upload);
        assert_eq!(loaded.endpoint.url, config.endpoint.url);
    }

    #[test]
    fn test_partial_toml_uses_defaults() {
        let config: AppConfig = toml::from_str(
            r#"
            [upload]
            chunk_size = 1048576

            [endpoint]
            key = "k"
            "#,
        )
        .unwrap();
        assert_eq!(config.upload.chunk_size, 1_048_576);
        assert_eq!(config.upload.batch_size, 5);
        assert_eq!(config.endpoint.key, "k");
        assert_eq!(config.endpoint.request_timeout_secs, 30);
        assert!(config.log.enabled);
    }

    #[test]
    fn test_validate() {
        let zero_batch = UploadConfig {
            batch_size: 0,
            ..UploadConfig::default()
        };
        assert!(matches!(
            zero_batch.validate(),
            Err(UploadError::Configuration(_))
        ));

        let zero_chunk = UploadConfig {
            chunk_size: 0,
            ..UploadConfig::default()
        };
        assert!(zero_chunk.validate().is_err());

        let inverted = UploadConfig {
            initial_backoff_ms: 100,
            max_backoff_ms: 10,
            ..UploadConfig::default()
        };
        assert!(inverted.validate().is_err());
    }

    #[test]
    fn test_retry_policy_from_config() {
        let config = UploadConfig {
            max_retries: 5,
            non_transient_attempts: 2,
            ..UploadConfig::default()
        };
        let policy = config.retry_policy();
        assert_eq!(policy.max_retries, 5);
        assert_eq!(policy.non_transient_attempts, 2);
        assert_eq!(policy.initial_backoff_ms, 100);
    }

    #[tokio::test]
    async fn test_load_invalid_file() {
        let temp_file = NamedTempFile::new().unwrap();
        tokio::fs::write(temp_file.path(), "[upload]\nbatch_size = 0\n")
            .await
            .unwrap();
        assert!(AppConfig::load_from_file(temp_file.path()).await.is_err());
    }
}
