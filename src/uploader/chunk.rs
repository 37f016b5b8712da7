// 上传分片定义
//
// 分片规则：
// - 除最后一个分片外，所有分片大小等于 chunk_size
// - 分片数量 = ceil(total_size / chunk_size)
// - 空数据源没有分片

use serde::{Deserialize, Serialize};
use std::ops::Range;

/// 默认分片大小: 25MB
pub const DEFAULT_CHUNK_SIZE: u32 = 25_000_000;

/// 默认批量大小（同时上传的分片数）
pub const DEFAULT_BATCH_SIZE: usize = 5;

/// 分片状态
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    /// 等待上传
    Pending,
    /// 上传中
    InFlight,
    /// 远端已确认
    Acked,
    /// 失败
    Failed,
}

impl ChunkStatus {
    pub fn is_acked(&self) -> bool {
        matches!(self, ChunkStatus::Acked)
    }
}

/// 计算分片数量
///
/// chunk_size 为 0 或分片数量超出 u32 范围时返回 None
pub fn calculate_chunk_count(total_size: u64, chunk_size: u32) -> Option<u32> {
    if chunk_size == 0 {
        return None;
    }
    u32::try_from(total_size.div_ceil(chunk_size as u64)).ok()
}

/// 计算指定分片的字节范围
pub fn chunk_range(total_size: u64, chunk_size: u32, index: u32) -> Range<u64> {
    let start = index as u64 * chunk_size as u64;
    let end = (start + chunk_size as u64).min(total_size);
    start..end.max(start)
}

/// 待签名的分片（临时对象，不持久化）
#[derive(Debug, Clone)]
pub struct Chunk {
    /// 分片索引
    pub index: u32,
    /// 起始偏移
    pub offset: u64,
    /// 分片数据
    pub data: Vec<u8>,
}

impl Chunk {
    pub fn new(index: u32, offset: u64, data: Vec<u8>) -> Self {
        Self {
            index,
            offset,
            data,
        }
    }

    /// 分片大小
    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }

    /// 字节范围
    pub fn range(&self) -> Range<u64> {
        self.offset..self.offset + self.size()
    }
}
