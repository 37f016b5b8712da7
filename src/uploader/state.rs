//! 上传状态（断点续传单元）
//!
//! `UploadState` 记录一次上传的全部进度：总大小、分片大小、每个分片的确认状态、
//! 事务上下文和数据源摘要。它是可序列化的自包含值，调用方可以随时导出为
//! [`ResumeData`]，在新进程中交给新的会话继续上传。
//!
//! ## 续传前提
//!
//! 续传时以下内容必须与生成续传数据时完全一致：
//! - 分片大小
//! - 总大小
//! - 事务上下文（事务 ID、节点、币种）
//! - 数据源内容（可随机读取的数据源通过 SHA-256 摘要校验，流式数据源由调用方保证）

use crate::error::{UploadError, UploadResult};
use crate::uploader::chunk::{calculate_chunk_count, chunk_range, ChunkStatus};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use std::path::Path;
use tracing::{debug, info};

/// 续传数据格式版本
pub const RESUME_DATA_VERSION: u32 = 1;

/// 事务标签
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub value: String,
}

/// 事务上下文
///
/// 把所有分片绑定到远端同一个事务（节点 + 币种 + 事务 ID）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransactionContext {
    /// 事务 ID
    pub id: String,
    /// 远端节点地址
    pub endpoint: String,
    /// 币种
    pub currency: String,
    /// 事务标签
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<Tag>,
}

impl TransactionContext {
    /// 创建新的事务上下文（随机事务 ID）
    pub fn new(endpoint: impl Into<String>, currency: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            endpoint: endpoint.into(),
            currency: currency.into(),
            tags: Vec::new(),
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = id.into();
        self
    }

    pub fn with_tag(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.push(Tag {
            name: name.into(),
            value: value.into(),
        });
        self
    }
}

/// 预先构建好的事务（事务模式上传）
#[derive(Debug, Clone)]
pub struct Transaction {
    pub context: TransactionContext,
    pub data: Vec<u8>,
}

impl Transaction {
    pub fn new(context: TransactionContext, data: impl Into<Vec<u8>>) -> Self {
        Self {
            context,
            data: data.into(),
        }
    }
}

/// 上传状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadState {
    /// 格式版本
    version: u32,
    /// 总大小
    total_size: u64,
    /// 总大小是否已确定（长度未知的流读完之前为 false）
    #[serde(default = "default_size_known")]
    size_known: bool,
    /// 分片大小
    chunk_size: u32,
    /// 每个分片的状态
    chunk_status: Vec<ChunkStatus>,
    /// 事务上下文
    context: TransactionContext,
    /// 数据源摘要
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content_digest: Option<String>,
    /// 已确认字节数（派生字段，加载时重新计算）
    #[serde(skip)]
    bytes_acked: u64,
}

fn default_size_known() -> bool {
    true
}

impl UploadState {
    /// 创建新的上传状态（所有分片等待上传）
    pub fn new(
        total_size: u64,
        chunk_size: u32,
        context: TransactionContext,
        content_digest: Option<String>,
    ) -> UploadResult<Self> {
        if chunk_size == 0 {
            return Err(UploadError::config("chunk_size 必须大于 0"));
        }
        let chunk_count = calculate_chunk_count(total_size, chunk_size).ok_or_else(|| {
            UploadError::config(format!(
                "分片数量超出上限: 总大小={} bytes, 分片大小={} bytes",
                total_size, chunk_size
            ))
        })?;

        info!(
            "创建上传状态: tx={}, 总大小={} bytes, 分片大小={} bytes, 分片数量={}",
            context.id, total_size, chunk_size, chunk_count
        );

        Ok(Self {
            version: RESUME_DATA_VERSION,
            total_size,
            size_known: true,
            chunk_size,
            chunk_status: vec![ChunkStatus::Pending; chunk_count as usize],
            context,
            content_digest,
            bytes_acked: 0,
        })
    }

    /// 创建长度未知的上传状态（分片在读取数据流时逐个追加）
    pub fn new_streaming(chunk_size: u32, context: TransactionContext) -> UploadResult<Self> {
        if chunk_size == 0 {
            return Err(UploadError::config("chunk_size 必须大于 0"));
        }
        info!(
            "创建上传状态（长度未知）: tx={}, 分片大小={} bytes",
            context.id, chunk_size
        );
        Ok(Self {
            version: RESUME_DATA_VERSION,
            total_size: 0,
            size_known: false,
            chunk_size,
            chunk_status: Vec::new(),
            context,
            content_digest: None,
            bytes_acked: 0,
        })
    }

    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    pub fn size_known(&self) -> bool {
        self.size_known
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn chunk_count(&self) -> u32 {
        self.chunk_status.len() as u32
    }

    pub fn context(&self) -> &TransactionContext {
        &self.context
    }

    pub fn content_digest(&self) -> Option<&str> {
        self.content_digest.as_deref()
    }

    pub fn bytes_acked(&self) -> u64 {
        self.bytes_acked
    }

    pub fn status(&self, index: u32) -> Option<ChunkStatus> {
        self.chunk_status.get(index as usize).copied()
    }

    pub fn statuses(&self) -> &[ChunkStatus] {
        &self.chunk_status
    }

    /// 分片字节范围
    ///
    /// 长度未确定时，已追加的分片都是完整分片（最后一个分片追加时长度即确定）
    pub fn chunk_range(&self, index: u32) -> Range<u64> {
        if self.size_known {
            chunk_range(self.total_size, self.chunk_size, index)
        } else {
            let start = index as u64 * self.chunk_size as u64;
            start..start + self.chunk_size as u64
        }
    }

    /// 已确认分片数
    pub fn acked_count(&self) -> u32 {
        self.chunk_status.iter().filter(|s| s.is_acked()).count() as u32
    }

    /// 等待上传的分片数
    pub fn pending_count(&self) -> u32 {
        self.chunk_status
            .iter()
            .filter(|s| matches!(s, ChunkStatus::Pending))
            .count() as u32
    }

    /// 是否全部确认（长度必须已确定）
    pub fn is_complete(&self) -> bool {
        self.size_known && self.chunk_status.iter().all(|s| s.is_acked())
    }

    /// 上传进度百分比
    pub fn progress(&self) -> f64 {
        if self.total_size == 0 {
            return if self.is_complete() { 100.0 } else { 0.0 };
        }
        (self.bytes_acked as f64 / self.total_size as f64) * 100.0
    }

    /// 按索引升序查找下一个待上传分片
    pub fn next_pending<F>(&self, mut eligible: F) -> Option<u32>
    where
        F: FnMut(u32) -> bool,
    {
        self.chunk_status
            .iter()
            .enumerate()
            .filter(|(_, s)| matches!(s, ChunkStatus::Pending))
            .map(|(i, _)| i as u32)
            .find(|i| eligible(*i))
    }

    /// 标记分片正在上传
    pub fn mark_in_flight(&mut self, index: u32) {
        self.set_status(index, ChunkStatus::InFlight);
    }

    /// 标记分片回到等待状态（瞬时失败后等待重试）
    pub fn mark_pending(&mut self, index: u32) {
        self.set_status(index, ChunkStatus::Pending);
    }

    /// 标记分片失败
    pub fn mark_failed(&mut self, index: u32) {
        self.set_status(index, ChunkStatus::Failed);
    }

    /// 标记分片已确认
    ///
    /// 返回 true 表示首次确认（重复确认不会重复计算字节数）
    pub fn mark_acked(&mut self, index: u32) -> bool {
        let range = self.chunk_range(index);
        match self.chunk_status.get_mut(index as usize) {
            Some(status) if !status.is_acked() => {
                *status = ChunkStatus::Acked;
                self.bytes_acked += range.end - range.start;
                true
            }
            _ => false,
        }
    }

    fn set_status(&mut self, index: u32, new_status: ChunkStatus) {
        if let Some(status) = self.chunk_status.get_mut(index as usize) {
            // 已确认的分片不会回退
            if !status.is_acked() {
                *status = new_status;
            }
        }
    }

    /// 追加一个从数据流读取到的分片（状态为上传中）
    ///
    /// `len` 小于分片大小说明数据流已结束，总大小随之确定。
    /// 数据流恰好在分片边界结束时调用 [`finish_stream`](Self::finish_stream)
    pub fn append_streamed_chunk(&mut self, len: u32) -> UploadResult<u32> {
        if self.size_known {
            return Err(UploadError::config("上传状态长度已确定，不能追加分片"));
        }
        if len == 0 || len > self.chunk_size {
            return Err(UploadError::config(format!(
                "分片长度 {} 无效，应在 1..={} 之间",
                len, self.chunk_size
            )));
        }
        let index = u32::try_from(self.chunk_status.len())
            .ok()
            .filter(|i| *i < u32::MAX)
            .ok_or_else(|| UploadError::config("分片数量超出上限"))?;
        self.total_size += len as u64;
        if len < self.chunk_size {
            self.size_known = true;
        }
        self.chunk_status.push(ChunkStatus::InFlight);
        debug!(
            "追加流式分片 #{}: len={}, 总大小={}, 长度确定={}",
            index, len, self.total_size, self.size_known
        );
        Ok(index)
    }

    /// 数据流已结束，确定总大小
    pub fn finish_stream(&mut self) {
        if !self.size_known {
            self.size_known = true;
            info!("数据流读取完毕，总大小={} bytes", self.total_size);
        }
    }

    /// 重新计算已确认字节数
    fn recompute_bytes_acked(&mut self) {
        self.bytes_acked = (0..self.chunk_count())
            .filter(|i| self.chunk_status[*i as usize].is_acked())
            .map(|i| {
                let r = self.chunk_range(i);
                r.end - r.start
            })
            .sum();
    }

    /// 校验续传状态与当前上传参数是否一致
    pub fn verify_compatible(
        &self,
        total_size: Option<u64>,
        chunk_size: u32,
        context: &TransactionContext,
        content_digest: Option<&str>,
    ) -> UploadResult<()> {
        if self.chunk_size != chunk_size {
            return Err(UploadError::ResumeMismatch(format!(
                "分片大小不一致: 续传数据={}, 当前={}",
                self.chunk_size, chunk_size
            )));
        }
        if let Some(total_size) = total_size {
            if self.total_size != total_size {
                return Err(UploadError::ResumeMismatch(format!(
                    "总大小不一致: 续传数据={}, 当前={}",
                    self.total_size, total_size
                )));
            }
        }
        if &self.context != context {
            return Err(UploadError::ResumeMismatch(format!(
                "事务上下文不一致: 续传数据={}@{}, 当前={}@{}",
                self.context.id, self.context.endpoint, context.id, context.endpoint
            )));
        }
        if let (Some(expected), Some(actual)) = (self.content_digest.as_deref(), content_digest) {
            if expected != actual {
                return Err(UploadError::ResumeMismatch("数据源内容摘要不一致".to_string()));
            }
        }
        Ok(())
    }

    /// 导出续传数据
    ///
    /// 上传中的分片导出为等待状态
    pub fn to_resume_data(&self) -> UploadResult<ResumeData> {
        if !self.size_known {
            return Err(UploadError::config("数据流长度未确定，无法导出续传数据"));
        }
        let mut snapshot = self.clone();
        for status in &mut snapshot.chunk_status {
            if *status == ChunkStatus::InFlight {
                *status = ChunkStatus::Pending;
            }
        }
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| UploadError::InvalidResumeData(format!("序列化失败: {}", e)))?;
        Ok(ResumeData(json))
    }

    /// 从续传数据恢复
    ///
    /// 上传中和失败的分片恢复为等待状态
    pub fn from_resume_data(data: &ResumeData) -> UploadResult<Self> {
        let mut state: UploadState = serde_json::from_str(&data.0)
            .map_err(|e| UploadError::InvalidResumeData(format!("解析失败: {}", e)))?;

        if state.version != RESUME_DATA_VERSION {
            return Err(UploadError::InvalidResumeData(format!(
                "不支持的版本: {}",
                state.version
            )));
        }
        if state.chunk_size == 0 {
            return Err(UploadError::InvalidResumeData("chunk_size 为 0".to_string()));
        }
        if !state.size_known {
            return Err(UploadError::InvalidResumeData("总大小未确定".to_string()));
        }
        let expected = calculate_chunk_count(state.total_size, state.chunk_size)
            .ok_or_else(|| {
                UploadError::InvalidResumeData(format!(
                    "分片数量超出上限: 总大小={}, 分片大小={}",
                    state.total_size, state.chunk_size
                ))
            })?;
        if state.chunk_status.len() != expected as usize {
            return Err(UploadError::InvalidResumeData(format!(
                "分片数量不一致: 记录={}, 计算={}",
                state.chunk_status.len(),
                expected
            )));
        }

        for status in &mut state.chunk_status {
            if matches!(status, ChunkStatus::InFlight | ChunkStatus::Failed) {
                *status = ChunkStatus::Pending;
            }
        }
        state.recompute_bytes_acked();

        info!(
            "从续传数据恢复上传状态: tx={}, 已确认 {}/{} 分片, {} bytes",
            state.context.id,
            state.acked_count(),
            state.chunk_count(),
            state.bytes_acked
        );
        Ok(state)
    }
}

/// 续传数据（序列化后的上传状态，自描述 JSON）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResumeData(String);

impl ResumeData {
    /// 从字符串构造（不校验，恢复时才解析）
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// 保存到文件
    pub async fn save_to_file(&self, path: impl AsRef<Path>) -> UploadResult<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(path, self.0.as_bytes()).await?;
        debug!("续传数据已保存: {:?}", path);
        Ok(())
    }

    /// 从文件加载
    pub async fn load_from_file(path: impl AsRef<Path>) -> UploadResult<Self> {
        let content = tokio::fs::read_to_string(path.as_ref()).await?;
        Ok(Self(content))
    }
}

impl std::fmt::Display for ResumeData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}
