// 传输接口
//
// 纯 I/O 边界：发送已签名的分片，所有分片确认后提交事务
// 超时由实现方负责，并归类为瞬时/非瞬时错误

use crate::remote::{ChunkAck, TransportError};
use crate::uploader::{SignedChunk, TransactionContext};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// 提交事务时携带的上传摘要
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadSummary {
    pub total_size: u64,
    pub chunk_size: u32,
    pub chunk_count: u32,
}

/// 传输客户端
#[async_trait]
pub trait TransportClient: Send + Sync {
    /// 发送单个分片
    async fn send(
        &self,
        chunk: &SignedChunk,
        context: &TransactionContext,
    ) -> Result<ChunkAck, TransportError>;

    /// 提交事务，返回远端分配的 ID
    async fn finalize(
        &self,
        context: &TransactionContext,
        summary: &UploadSummary,
    ) -> Result<String, TransportError>;
}
