// 上传数据源
//
// 三种实现：
// - BufferSource：内存缓冲区，可随机读取
// - FileSource：本地文件，可随机读取（阻塞 I/O 放到 spawn_blocking）
// - StreamSource：异步流，只能向前读取一次，长度可以已知也可以在读完时得知

use crate::error::{UploadError, UploadResult};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::Mutex;
use tracing::debug;

/// 上传数据源
#[async_trait]
pub trait ChunkSource: Send + Sync {
    /// 数据总长度（流式数据源可能未知）
    fn length(&self) -> Option<u64>;

    /// 是否支持随机读取（决定能否跨进程续传）
    fn is_seekable(&self) -> bool;

    /// 读取 [offset, offset + len) 范围的数据
    ///
    /// 长度已知时必须完整返回；长度未知的流在结尾处可以返回较短的数据
    async fn read(&self, offset: u64, len: u32) -> UploadResult<Vec<u8>>;

    /// 数据内容摘要（SHA-256 hex），用于续传时校验数据源一致
    async fn content_digest(&self) -> UploadResult<Option<String>> {
        Ok(None)
    }
}

/// 检查读取范围是否越界
fn check_bounds(offset: u64, len: u32, available: u64) -> UploadResult<()> {
    if offset + len as u64 > available {
        return Err(UploadError::SourceExhausted {
            offset,
            len: len as u64,
            available,
        });
    }
    Ok(())
}

// =====================================================
// 内存数据源
// =====================================================

/// 内存缓冲区数据源
#[derive(Debug, Clone)]
pub struct BufferSource {
    data: Arc<Vec<u8>>,
}

impl BufferSource {
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            data: Arc::new(data.into()),
        }
    }
}

#[async_trait]
impl ChunkSource for BufferSource {
    fn length(&self) -> Option<u64> {
        Some(self.data.len() as u64)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    async fn read(&self, offset: u64, len: u32) -> UploadResult<Vec<u8>> {
        check_bounds(offset, len, self.data.len() as u64)?;
        let start = offset as usize;
        Ok(self.data[start..start + len as usize].to_vec())
    }

    async fn content_digest(&self) -> UploadResult<Option<String>> {
        let data = self.data.clone();
        let digest = tokio::task::spawn_blocking(move || hex::encode(Sha256::digest(&data[..])))
            .await
            .map_err(|e| UploadError::Io(format!("计算摘要任务执行失败: {}", e)))?;
        Ok(Some(digest))
    }
}

// =====================================================
// 文件数据源
// =====================================================

/// 本地文件数据源
#[derive(Debug, Clone)]
pub struct FileSource {
    path: PathBuf,
    size: u64,
}

impl FileSource {
    /// 打开本地文件（读取文件大小）
    pub async fn open(path: impl AsRef<Path>) -> UploadResult<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = tokio::fs::metadata(&path)
            .await
            .map_err(|e| UploadError::SourceUnavailable(format!("无法读取文件 {:?}: {}", path, e)))?;
        if !metadata.is_file() {
            return Err(UploadError::SourceUnavailable(format!(
                "不是普通文件: {:?}",
                path
            )));
        }
        Ok(Self {
            path,
            size: metadata.len(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ChunkSource for FileSource {
    fn length(&self) -> Option<u64> {
        Some(self.size)
    }

    fn is_seekable(&self) -> bool {
        true
    }

    async fn read(&self, offset: u64, len: u32) -> UploadResult<Vec<u8>> {
        check_bounds(offset, len, self.size)?;
        let path = self.path.clone();

        let data = tokio::task::spawn_blocking(move || -> std::io::Result<Vec<u8>> {
            let mut file = std::fs::File::open(&path)?;
            file.seek(SeekFrom::Start(offset))?;
            let mut buffer = vec![0u8; len as usize];
            file.read_exact(&mut buffer)?;
            Ok(buffer)
        })
        .await
        .map_err(|e| UploadError::Io(format!("读取分片任务执行失败: {}", e)))?;

        data.map_err(|e| {
            if e.kind() == std::io::ErrorKind::UnexpectedEof {
                // 文件在上传过程中被截断
                UploadError::SourceExhausted {
                    offset,
                    len: len as u64,
                    available: self.size,
                }
            } else {
                UploadError::SourceUnavailable(format!("读取文件失败 {:?}: {}", self.path, e))
            }
        })
    }

    async fn content_digest(&self) -> UploadResult<Option<String>> {
        let path = self.path.clone();
        let digest = tokio::task::spawn_blocking(move || -> std::io::Result<String> {
            let file = std::fs::File::open(&path)?;
            let mut reader = std::io::BufReader::with_capacity(1024 * 1024, file);
            let mut hasher = Sha256::new();
            let mut buffer = [0u8; 65536];
            loop {
                let n = reader.read(&mut buffer)?;
                if n == 0 {
                    break;
                }
                hasher.update(&buffer[..n]);
            }
            Ok(hex::encode(hasher.finalize()))
        })
        .await
        .map_err(|e| UploadError::Io(format!("计算摘要任务执行失败: {}", e)))??;
        Ok(Some(digest))
    }
}

// =====================================================
// 流式数据源
// =====================================================

struct StreamState {
    reader: Box<dyn AsyncRead + Send + Unpin>,
    /// 当前读取位置
    position: u64,
    /// 是否已读到流末尾
    eof: bool,
}

/// 流式数据源（只能向前读取）
pub struct StreamSource {
    state: Mutex<StreamState>,
    length: Option<u64>,
}

impl StreamSource {
    /// 创建流式数据源
    ///
    /// # 参数
    /// * `reader` - 异步读取器
    /// * `length` - 数据长度，未知时为 None（读到流末尾时确定）
    pub fn new<R>(reader: R, length: Option<u64>) -> Self
    where
        R: AsyncRead + Send + Unpin + 'static,
    {
        Self {
            state: Mutex::new(StreamState {
                reader: Box::new(reader),
                position: 0,
                eof: false,
            }),
            length,
        }
    }

    /// 尽量读满 buf，返回实际读取的字节数（小于 buf 长度表示流结束）
    async fn fill(state: &mut StreamState, buf: &mut [u8]) -> UploadResult<usize> {
        let mut filled = 0;
        while filled < buf.len() {
            let n = state
                .reader
                .read(&mut buf[filled..])
                .await
                .map_err(|e| UploadError::SourceUnavailable(format!("读取数据流失败: {}", e)))?;
            if n == 0 {
                state.eof = true;
                break;
            }
            filled += n;
        }
        state.position += filled as u64;
        Ok(filled)
    }
}

#[async_trait]
impl ChunkSource for StreamSource {
    fn length(&self) -> Option<u64> {
        self.length
    }

    fn is_seekable(&self) -> bool {
        false
    }

    async fn read(&self, offset: u64, len: u32) -> UploadResult<Vec<u8>> {
        if let Some(length) = self.length {
            check_bounds(offset, len, length)?;
        }

        let mut state = self.state.lock().await;

        if offset < state.position {
            return Err(UploadError::SourceUnavailable(format!(
                "数据流无法回退: 请求 offset={}, 当前位置={}",
                offset, state.position
            )));
        }

        // 向前跳过
        if offset > state.position {
            let mut remaining = offset - state.position;
            debug!("数据流向前跳过 {} bytes", remaining);
            let mut scratch = vec![0u8; remaining.min(64 * 1024) as usize];
            while remaining > 0 && !state.eof {
                let step = remaining.min(scratch.len() as u64) as usize;
                let n = Self::fill(&mut state, &mut scratch[..step]).await?;
                remaining -= n as u64;
            }
            if remaining > 0 {
                return Err(UploadError::SourceExhausted {
                    offset,
                    len: len as u64,
                    available: state.position,
                });
            }
        }

        let mut buffer = vec![0u8; len as usize];
        let n = Self::fill(&mut state, &mut buffer).await?;
        buffer.truncate(n);

        if self.length.is_some() && n < len as usize {
            return Err(UploadError::SourceExhausted {
                offset,
                len: len as u64,
                available: state.position,
            });
        }

        Ok(buffer)
    }
}
