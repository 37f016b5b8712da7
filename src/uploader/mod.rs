// 上传引擎模块
//
// 分片上传状态机：
// - 数据源按固定大小切分为有序分片
// - 分片签名后按批次并发发送（指数退避重试）
// - 上传状态可随时导出为续传数据，在新进程中继续上传
// - 所有分片确认后提交事务，完成事件只触发一次

pub mod chunk;
pub mod events;
pub mod folder;
pub mod retry;
pub mod scheduler;
pub mod session;
pub mod signer;
pub mod source;
pub mod state;
pub mod task;
pub mod transport;

pub use chunk::{
    calculate_chunk_count, chunk_range, Chunk, ChunkStatus, DEFAULT_BATCH_SIZE,
    DEFAULT_CHUNK_SIZE,
};
pub use events::{EventBus, EventHandler, SubscriptionId, UploadEvent};
pub use folder::{
    FolderEntry, FolderScanner, FolderUploadResult, FolderUploader, ScanOptions, ScannedFile,
};
pub use retry::{RetryDecision, RetryPolicy};
pub use scheduler::{ChunkScheduler, SchedulerControl, SchedulerOptions, UploadReceipt};
pub use session::{UploadHandle, UploadSession, Uploader};
pub use signer::{ChunkSigner, DigestSigner, SignedChunk};
pub use source::{BufferSource, ChunkSource, FileSource, StreamSource};
pub use state::{ResumeData, Tag, Transaction, TransactionContext, UploadState};
pub use task::{SessionInfo, SessionStatus};
pub use transport::{TransportClient, UploadSummary};
