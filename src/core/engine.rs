use crate::config::MirrorConfig;
use crate::core::comparator::FileComparator;
use crate::core::error::{Result, SyncError};
use crate::core::file_sync::FileSynchronizer;
use crate::core::folder_sync::FolderSynchronizer;
use crate::core::matcher::MatchStrategy;
use crate::core::operator::{FileOperator, FolderOperator};
use crate::core::stats::SyncStats;
use crate::storage::{FileSystem, LocalFileSystem};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// 一次完整的镜像同步
#[async_trait]
pub trait MirrorPass: Send + Sync {
    async fn synchronize(&self, source: &Path, destination: &Path) -> Result<SyncStats>;
}

/// 同步引擎：先同步文件夹结构，再同步文件
pub struct SyncEngine {
    fs: Arc<dyn FileSystem>,
    folders: Arc<FolderOperator>,
    folder_sync: FolderSynchronizer,
    file_sync: FileSynchronizer,
}

impl SyncEngine {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_config(fs, MirrorConfig::default())
    }

    /// 本地文件系统上的引擎
    pub fn local(config: MirrorConfig) -> Self {
        Self::with_config(Arc::new(LocalFileSystem::new()), config)
    }

    pub fn with_config(fs: Arc<dyn FileSystem>, config: MirrorConfig) -> Self {
        let comparator = Arc::new(FileComparator::with_config(fs.clone(), config.compare.clone()));
        let matcher = Arc::new(MatchStrategy::with_config(
            fs.clone(),
            comparator.clone(),
            config.matching.clone(),
        ));
        let files = Arc::new(FileOperator::new(fs.clone(), comparator, config.retry.clone()));
        let folders = Arc::new(FolderOperator::new(fs.clone(), config.retry.clone()));

        Self {
            folder_sync: FolderSynchronizer::new(
                fs.clone(),
                matcher.clone(),
                files.clone(),
                folders.clone(),
            ),
            file_sync: FileSynchronizer::new(
                fs.clone(),
                matcher,
                files,
                folders.clone(),
                config.progress_every,
            ),
            fs,
            folders,
        }
    }

    async fn validate(&self, source: &Path, destination: &Path) -> Result<()> {
        if source.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument("源目录为空".to_string()));
        }
        if destination.as_os_str().is_empty() {
            return Err(SyncError::InvalidArgument("目标目录为空".to_string()));
        }
        if !self.fs.dir_exists(source).await {
            return Err(SyncError::SourceMissing(source.to_path_buf()));
        }

        // 互相嵌套的两个目录无法镜像
        let source_abs = absolute(source).await;
        let dest_abs = absolute(destination).await;
        if source_abs.starts_with(&dest_abs) || dest_abs.starts_with(&source_abs) {
            return Err(SyncError::InvalidArgument(format!(
                "源目录与目标目录不能相同或互相包含: {} / {}",
                source.display(),
                destination.display()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl MirrorPass for SyncEngine {
    async fn synchronize(&self, source: &Path, destination: &Path) -> Result<SyncStats> {
        self.validate(source, destination).await?;

        if !self.fs.dir_exists(destination).await {
            info!("目标目录不存在，创建: {}", destination.display());
            self.folders.create(destination).await?;
        }

        let started = Instant::now();
        info!(
            "开始同步 [{}]: {} -> {}",
            self.fs.name(),
            source.display(),
            destination.display()
        );

        let mut stats = SyncStats::new();
        self.folder_sync
            .synchronize(source, destination, &mut stats)
            .await?;
        self.file_sync
            .synchronize(source, destination, &mut stats)
            .await?;

        info!(
            "同步完成，耗时 {:.2}s: {}",
            started.elapsed().as_secs_f64(),
            stats
        );
        Ok(stats)
    }
}

/// 尽量解析为规范路径；不存在时退回到绝对路径
async fn absolute(path: &Path) -> PathBuf {
    match tokio::fs::canonicalize(path).await {
        Ok(p) => p,
        Err(_) => std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()),
    }
}
