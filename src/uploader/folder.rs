//! 文件夹扫描和批量上传模块
//!
//! 负责:
//! - 递归扫描本地文件夹（按相对路径排序）
//! - 为每个文件生成事务上下文
//! - 逐个文件上传，汇总远端 ID

use crate::error::{UploadError, UploadResult};
use crate::uploader::session::Uploader;
use crate::uploader::TransactionContext;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// 文件扫描结果
#[derive(Debug, Clone)]
pub struct ScannedFile {
    /// 本地文件路径
    pub local_path: PathBuf,
    /// 相对于扫描根目录的路径
    pub relative_path: PathBuf,
    /// 文件大小（字节）
    pub size: u64,
}

impl ScannedFile {
    /// 统一使用 `/` 分隔的相对路径
    pub fn relative_key(&self) -> String {
        self.relative_path
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// 文件夹扫描配置
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// 是否跟随符号链接
    pub follow_symlinks: bool,
    /// 最大文件大小（字节），超过此大小的文件将被跳过
    pub max_file_size: Option<u64>,
    /// 跳过隐藏文件（以.开头的文件和文件夹）
    pub skip_hidden: bool,
}

/// 文件夹扫描器
#[derive(Debug, Clone, Default)]
pub struct FolderScanner {
    options: ScanOptions,
}

impl FolderScanner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ScanOptions) -> Self {
        Self { options }
    }

    /// 递归扫描文件夹，返回按相对路径排序的文件列表
    pub fn scan(&self, root_path: impl AsRef<Path>) -> UploadResult<Vec<ScannedFile>> {
        let root_path = root_path.as_ref();
        if !root_path.is_dir() {
            return Err(UploadError::config(format!(
                "扫描路径不存在或不是文件夹: {}",
                root_path.display()
            )));
        }

        info!("开始扫描文件夹: {}", root_path.display());
        let skip_hidden = self.options.skip_hidden;
        let walker = WalkDir::new(root_path)
            .follow_links(self.options.follow_symlinks)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !(skip_hidden && is_hidden(e)));

        let mut files = Vec::new();
        for entry in walker {
            let entry = entry.map_err(|e| UploadError::Io(format!("读取目录失败: {}", e)))?;
            if !entry.file_type().is_file() {
                continue;
            }
            let metadata = entry
                .metadata()
                .map_err(|e| UploadError::Io(format!("读取文件元数据失败: {}", e)))?;
            let size = metadata.len();

            if let Some(max) = self.options.max_file_size {
                if size > max {
                    warn!(
                        "跳过过大的文件: {} ({} > {})",
                        entry.path().display(),
                        format_bytes(size),
                        format_bytes(max)
                    );
                    continue;
                }
            }

            let relative_path = entry
                .path()
                .strip_prefix(root_path)
                .map(Path::to_path_buf)
                .map_err(|e| UploadError::Io(format!("计算相对路径失败: {}", e)))?;
            debug!("扫描到文件: {:?}, size={}", relative_path, size);

            files.push(ScannedFile {
                local_path: entry.path().to_path_buf(),
                relative_path,
                size,
            });
        }

        files.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        info!(
            "文件夹扫描完成: {} 个文件，总大小 {}",
            files.len(),
            format_bytes(files.iter().map(|f| f.size).sum())
        );
        Ok(files)
    }
}

fn is_hidden(entry: &walkdir::DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|s| s.starts_with('.'))
        .unwrap_or(false)
}

/// 单个文件的上传结果
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderEntry {
    pub relative_path: String,
    pub size: u64,
    pub remote_id: String,
}

/// 文件夹上传结果
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FolderUploadResult {
    pub entries: Vec<FolderEntry>,
    /// 索引文件（相对路径）
    #[serde(skip_serializing_if = "Option::is_none")]
    pub index_file: Option<String>,
}

impl FolderUploadResult {
    pub fn total_size(&self) -> u64 {
        self.entries.iter().map(|e| e.size).sum()
    }

    pub fn remote_id_of(&self, relative_path: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.relative_path == relative_path)
            .map(|e| e.remote_id.as_str())
    }
}

/// 文件夹上传器
///
/// 逐个文件调用单文件上传，任一文件失败则整体失败（已上传的文件保留在远端）
#[derive(Debug, Clone)]
pub struct FolderUploader {
    uploader: Uploader,
    scanner: FolderScanner,
    index_file: Option<String>,
}

impl FolderUploader {
    pub fn new(uploader: Uploader) -> Self {
        Self {
            uploader,
            scanner: FolderScanner::new(),
            index_file: None,
        }
    }

    pub fn with_scan_options(mut self, options: ScanOptions) -> Self {
        self.scanner = FolderScanner::with_options(options);
        self
    }

    /// 指定索引文件（必须存在于文件夹中）
    pub fn with_index_file(mut self, index_file: impl Into<String>) -> Self {
        self.index_file = Some(index_file.into());
        self
    }

    /// 上传文件夹
    ///
    /// # 参数
    /// * `root` - 文件夹路径
    /// * `make_context` - 为每个文件生成事务上下文
    pub async fn upload<F>(
        &self,
        root: impl AsRef<Path>,
        mut make_context: F,
    ) -> UploadResult<FolderUploadResult>
    where
        F: FnMut(&ScannedFile) -> TransactionContext,
    {
        let root = root.as_ref();
        let files = self.scanner.scan(root)?;

        if let Some(index_file) = &self.index_file {
            if !files.iter().any(|f| &f.relative_key() == index_file) {
                return Err(UploadError::config(format!(
                    "索引文件不存在: {}",
                    index_file
                )));
            }
        }

        let mut result = FolderUploadResult {
            entries: Vec::with_capacity(files.len()),
            index_file: self.index_file.clone(),
        };

        for (i, file) in files.iter().enumerate() {
            let relative = file.relative_key();
            info!(
                "上传文件 [{}/{}]: {} ({})",
                i + 1,
                files.len(),
                relative,
                format_bytes(file.size)
            );

            let session = self
                .uploader
                .from_file(&file.local_path, make_context(file))
                .await?;
            let receipt = session.start().await?.await?;

            result.entries.push(FolderEntry {
                relative_path: relative,
                size: file.size,
                remote_id: receipt.remote_id,
            });
        }

        info!(
            "文件夹上传完成: {} 个文件，总大小 {}",
            result.entries.len(),
            format_bytes(result.total_size())
        );
        Ok(result)
    }
}

/// 辅助函数：格式化字节大小
pub fn format_bytes(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if bytes >= GB {
        format!("{:.2} GB", bytes as f64 / GB as f64)
    } else if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}
