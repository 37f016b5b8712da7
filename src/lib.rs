// Resumable Uploader
// 可断点续传的分片上传引擎

// 配置管理模块
pub mod config;

// 错误类型
pub mod error;

// 日志模块
pub mod logging;

// 远端节点 HTTP 客户端
pub mod remote;

// 上传引擎模块
pub mod uploader;

// 导出常用类型
pub use config::{AppConfig, EndpointConfig, LogConfig, UploadConfig};
pub use error::{UploadError, UploadResult};
pub use remote::{HttpTransport, TransportError, TransportErrorKind};
pub use uploader::{
    BufferSource, ChunkSigner, ChunkSource, DigestSigner, FileSource, FolderUploader, ResumeData,
    SessionStatus, StreamSource, Transaction, TransactionContext, TransportClient, UploadEvent,
    UploadHandle, UploadReceipt, UploadSession, UploadState, Uploader,
};
