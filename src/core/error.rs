use crate::storage::FsError;
use std::path::PathBuf;
use thiserror::Error;

/// 同步引擎与调度器的错误
#[derive(Debug, Error)]
pub enum SyncError {
    /// 文件系统操作失败
    #[error(transparent)]
    Fs(#[from] FsError),

    /// 参数校验失败
    #[error("参数无效: {0}")]
    InvalidArgument(String),

    /// 源目录不存在
    #[error("源目录不存在: {0}")]
    SourceMissing(PathBuf),

    /// 调度器已经启动
    #[error("定时同步已在运行")]
    AlreadyRunning,
}

pub type Result<T> = std::result::Result<T, SyncError>;
