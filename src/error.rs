//! 上传引擎错误类型
//!
//! 错误分类：
//! - 配置错误、数据源错误、签名错误：致命，不重试
//! - 传输错误：根据 transient 标记决定是否重试

use crate::remote::TransportError;
use thiserror::Error;

/// 上传引擎统一错误类型
///
/// 需要 Clone：同一个终态结果会分发给多个等待者
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum UploadError {
    /// 配置错误（批量大小/分片大小非法，或启动后修改配置）
    #[error("配置错误: {0}")]
    Configuration(String),

    /// 数据源数据不足
    #[error("数据源数据不足: offset={offset}, len={len}, available={available}")]
    SourceExhausted { offset: u64, len: u64, available: u64 },

    /// 数据源不可用（流式数据源无法回退到已读取的位置等）
    #[error("数据源不可用: {0}")]
    SourceUnavailable(String),

    /// 分片签名失败
    #[error("分片签名失败: {0}")]
    Signing(String),

    /// 传输失败（重试耗尽或不可重试）
    #[error("传输失败: {0}")]
    Transport(#[from] TransportError),

    /// 续传数据与当前上传不匹配
    #[error("续传数据不匹配: {0}")]
    ResumeMismatch(String),

    /// 续传数据无法解析
    #[error("续传数据无效: {0}")]
    InvalidResumeData(String),

    /// 上传已取消
    #[error("上传已取消")]
    Cancelled,

    /// 本地 I/O 错误
    #[error("I/O 错误: {0}")]
    Io(String),
}

impl UploadError {
    /// 快速构造配置错误
    pub fn config(msg: impl Into<String>) -> Self {
        UploadError::Configuration(msg.into())
    }

    /// 是否为传输层错误
    pub fn is_transport(&self) -> bool {
        matches!(self, UploadError::Transport(_))
    }
}

impl From<std::io::Error> for UploadError {
    fn from(e: std::io::Error) -> Self {
        UploadError::Io(e.to_string())
    }
}

/// 上传引擎 Result 别名
pub type UploadResult<T> = std::result::Result<T, UploadError>;
