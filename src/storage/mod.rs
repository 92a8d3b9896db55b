pub mod local;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use local::LocalFileSystem;

/// 文件系统操作错误
#[derive(Debug, Error)]
pub enum FsError {
    /// 源路径不存在（永久错误）
    #[error("路径不存在: {0}")]
    NotFound(PathBuf),

    /// 目标已存在且未要求覆盖（永久错误）
    #[error("目标已存在: {0}")]
    AlreadyExists(PathBuf),

    /// 非递归删除非空目录（永久错误）
    #[error("目录非空: {0}")]
    NotEmpty(PathBuf),

    /// 参数校验失败（永久错误）
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 其他 I/O 错误（文件被占用、权限被拒绝等），可重试
    #[error("I/O 错误 {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl FsError {
    /// 按 io::ErrorKind 归类错误
    pub fn from_io(path: impl Into<PathBuf>, err: io::Error) -> Self {
        let path = path.into();
        match err.kind() {
            io::ErrorKind::NotFound => FsError::NotFound(path),
            io::ErrorKind::AlreadyExists => FsError::AlreadyExists(path),
            io::ErrorKind::DirectoryNotEmpty => FsError::NotEmpty(path),
            _ => FsError::Io { path, source: err },
        }
    }

    /// 是否为可重试的瞬时错误
    pub fn is_transient(&self) -> bool {
        matches!(self, FsError::Io { .. })
    }
}

pub type FsResult<T> = std::result::Result<T, FsError>;

/// 文件元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub last_write_time_utc: DateTime<Utc>,
    /// 部分平台/文件系统不提供创建时间
    pub creation_time_utc: Option<DateTime<Utc>>,
}

/// 目录元数据
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirStat {
    pub creation_time_utc: Option<DateTime<Utc>>,
}

/// 文件系统抽象接口
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// 文件是否存在（目录返回 false）
    async fn file_exists(&self, path: &Path) -> bool;

    /// 目录是否存在
    async fn dir_exists(&self, path: &Path) -> bool;

    /// 读取整个文件
    async fn read(&self, path: &Path) -> FsResult<Vec<u8>>;

    /// 读取文件的一部分，文件剩余不足时返回实际可用的数据
    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> FsResult<Vec<u8>>;

    /// 写入整个文件
    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()>;

    /// 复制文件，保留修改时间（以及平台支持时的创建时间）
    async fn copy_file(&self, from: &Path, to: &Path, overwrite: bool) -> FsResult<()>;

    /// 移动文件，目标存在时返回 AlreadyExists
    async fn move_file(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// 删除文件
    async fn delete_file(&self, path: &Path) -> FsResult<()>;

    /// 创建目录（含父目录）
    async fn create_dir(&self, path: &Path) -> FsResult<()>;

    /// 删除目录
    async fn delete_dir(&self, path: &Path, recursive: bool) -> FsResult<()>;

    /// 移动目录，目标存在时返回 AlreadyExists
    async fn move_dir(&self, from: &Path, to: &Path) -> FsResult<()>;

    /// 列出目录下的文件（不递归）
    async fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>>;

    /// 列出目录下的子目录（不递归）
    async fn list_dirs(&self, dir: &Path) -> FsResult<Vec<PathBuf>>;

    /// 获取文件元数据
    async fn stat_file(&self, path: &Path) -> FsResult<FileStat>;

    /// 获取目录元数据
    async fn stat_dir(&self, path: &Path) -> FsResult<DirStat>;

    /// 递归列出所有文件
    async fn list_all_files(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        let mut files = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            files.extend(self.list_files(&dir).await?);
            pending.extend(self.list_dirs(&dir).await?);
        }
        Ok(files)
    }

    /// 递归列出所有子目录（不含根目录本身）
    async fn list_all_folders(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        let mut folders = Vec::new();
        let mut pending = vec![root.to_path_buf()];
        while let Some(dir) = pending.pop() {
            let children = self.list_dirs(&dir).await?;
            folders.extend(children.iter().cloned());
            pending.extend(children);
        }
        Ok(folders)
    }

    /// 获取文件系统名称（用于日志）
    fn name(&self) -> &str;
}

/// 把 `path` 从 `from_root` 重新挂到 `to_root` 下
pub fn reroot(path: &Path, from_root: &Path, to_root: &Path) -> Option<PathBuf> {
    let relative = path.strip_prefix(from_root).ok()?;
    if relative.as_os_str().is_empty() {
        Some(to_root.to_path_buf())
    } else {
        Some(to_root.join(relative))
    }
}
