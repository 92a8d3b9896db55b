//! 文件层同步：按大小分桶寻找被移动/重命名的文件

use crate::core::error::{Result, SyncError};
use crate::core::matcher::{MatchOutcome, MatchStrategy};
use crate::core::operator::{CopyOutcome, FileOperator, FolderOperator};
use crate::core::stats::SyncStats;
use crate::storage::{reroot, FileSystem};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 候选索引：文件大小 -> 尚未处理的目标文件
///
/// 0 字节的文件不入索引，大小为 0 时无法区分不同文件。
#[derive(Debug, Default)]
pub struct CandidateIndex {
    buckets: HashMap<u64, Vec<PathBuf>>,
}

impl CandidateIndex {
    pub async fn build(fs: &dyn FileSystem, dest_files: &[PathBuf]) -> Self {
        let mut index = Self::default();
        for path in dest_files {
            match fs.stat_file(path).await {
                Ok(stat) => index.insert(stat.size, path.clone()),
                Err(e) => warn!("读取目标文件信息失败，不参与匹配: {}", e),
            }
        }
        index
    }

    pub fn insert(&mut self, size: u64, path: PathBuf) {
        if size > 0 {
            self.buckets.entry(size).or_default().push(path);
        }
    }

    pub fn candidates(&self, size: u64) -> Vec<PathBuf> {
        self.buckets.get(&size).cloned().unwrap_or_default()
    }

    pub fn remove(&mut self, size: u64, path: &Path) {
        if let Some(bucket) = self.buckets.get_mut(&size) {
            bucket.retain(|p| p != path);
            if bucket.is_empty() {
                self.buckets.remove(&size);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.buckets.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }
}

/// 单次文件同步的工作状态
struct FilePass<'a> {
    source: &'a Path,
    destination: &'a Path,
    /// 源侧所有文件（用于判断候选文件是否本就在正确位置）
    source_files: HashSet<PathBuf>,
    index: CandidateIndex,
    processed: HashSet<PathBuf>,
}

/// 文件同步器
pub struct FileSynchronizer {
    fs: Arc<dyn FileSystem>,
    matcher: Arc<MatchStrategy>,
    files: Arc<FileOperator>,
    folders: Arc<FolderOperator>,
    progress_every: usize,
}

impl FileSynchronizer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        matcher: Arc<MatchStrategy>,
        files: Arc<FileOperator>,
        folders: Arc<FolderOperator>,
        progress_every: usize,
    ) -> Self {
        Self {
            fs,
            matcher,
            files,
            folders,
            progress_every: progress_every.max(1),
        }
    }

    /// 让目标侧文件与源侧一致
    pub async fn synchronize(
        &self,
        source: &Path,
        destination: &Path,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let source_files = self.fs.list_all_files(source).await?;
        let dest_files = self.fs.list_all_files(destination).await?;
        info!(
            "文件扫描完成: 源 {} 个, 目标 {} 个",
            source_files.len(),
            dest_files.len()
        );

        let index = CandidateIndex::build(self.fs.as_ref(), &dest_files).await;
        debug!("候选索引: {} 个文件", index.len());

        let mut pass = FilePass {
            source,
            destination,
            source_files: source_files.iter().cloned().collect(),
            index,
            processed: HashSet::new(),
        };

        let total = source_files.len();
        for (i, source_file) in source_files.iter().enumerate() {
            self.sync_file(source_file, &mut pass, stats).await?;

            let done = i + 1;
            if done % self.progress_every == 0 && done < total {
                log_progress(done, total);
            }
        }
        log_progress(total, total);

        // 未被处理的目标文件都是多余的
        for dest_file in &dest_files {
            if pass.processed.contains(dest_file) {
                continue;
            }
            if self.files.delete(dest_file).await? {
                debug!("删除多余文件: {}", dest_file.display());
                stats.files_deleted += 1;
            }
        }

        Ok(())
    }

    async fn sync_file(
        &self,
        source_file: &Path,
        pass: &mut FilePass<'_>,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let dest_file = reroot(source_file, pass.source, pass.destination).ok_or_else(|| {
            SyncError::InvalidArgument(format!("{} 不在源目录下", source_file.display()))
        })?;

        if let Some(parent) = dest_file.parent() {
            self.folders.create(parent).await?;
        }

        if !self.fs.file_exists(&dest_file).await {
            return self.sync_missing(source_file, dest_file, pass, stats).await;
        }

        pass.processed.insert(dest_file.clone());

        let source_stat = self.fs.stat_file(source_file).await?;
        let dest_stat = self.fs.stat_file(&dest_file).await?;
        if source_stat.size != dest_stat.size
            || source_stat.last_write_time_utc != dest_stat.last_write_time_utc
        {
            if self.files.copy(source_file, &dest_file, true).await? == CopyOutcome::Copied {
                debug!("更新文件: {}", dest_file.display());
                stats.files_changed += 1;
            }
        }

        Ok(())
    }

    /// 目标位置没有文件：先找能移过来的旧副本，找不到再复制
    async fn sync_missing(
        &self,
        source_file: &Path,
        dest_file: PathBuf,
        pass: &mut FilePass<'_>,
        stats: &mut SyncStats,
    ) -> Result<()> {
        // 源文件在扫描后消失说明快照已过期，直接中止本次同步
        let size = self.fs.stat_file(source_file).await?.size;

        for candidate in pass.index.candidates(size) {
            if pass.processed.contains(&candidate) || self.belongs_in_place(&candidate, pass) {
                continue;
            }

            match self
                .matcher
                .match_file(source_file, &candidate, pass.source, pass.destination)
                .await
            {
                MatchOutcome::Match => {
                    match self.files.move_file(&candidate, &dest_file, false).await {
                        Ok(()) => {
                            debug!("移动文件: {} -> {}", candidate.display(), dest_file.display());
                            pass.index.remove(size, &candidate);
                            pass.processed.insert(candidate);
                            pass.processed.insert(dest_file);
                            stats.files_moved += 1;
                            return Ok(());
                        }
                        Err(e) => {
                            warn!("移动文件失败，改为复制: {}: {}", candidate.display(), e);
                            break;
                        }
                    }
                }
                MatchOutcome::NoMatch => {}
                MatchOutcome::Indeterminate(reason) => {
                    warn!("跳过无法比较的候选文件 {}: {}", candidate.display(), reason);
                }
            }
        }

        self.files.copy(source_file, &dest_file, false).await?;
        debug!("新增文件: {}", dest_file.display());
        pass.processed.insert(dest_file);
        stats.files_changed += 1;
        Ok(())
    }

    /// 候选文件在源侧有同路径文件，它应留在原处
    fn belongs_in_place(&self, candidate: &Path, pass: &FilePass<'_>) -> bool {
        reroot(candidate, pass.destination, pass.source)
            .map(|counterpart| pass.source_files.contains(&counterpart))
            .unwrap_or(false)
    }
}

fn log_progress(done: usize, total: usize) {
    let percent = if total == 0 {
        100.0
    } else {
        done as f64 * 100.0 / total as f64
    };
    info!("文件同步进度: {}/{} ({:.1}%)", done, total, percent);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_index_excludes_empty_files() {
        let mut index = CandidateIndex::default();
        index.insert(0, PathBuf::from("empty"));
        index.insert(5, PathBuf::from("a"));
        index.insert(5, PathBuf::from("b"));

        assert!(index.candidates(0).is_empty());
        assert_eq!(index.candidates(5).len(), 2);
        assert_eq!(index.len(), 2);

        index.remove(5, Path::new("a"));
        assert_eq!(index.candidates(5), vec![PathBuf::from("b")]);
        index.remove(5, Path::new("b"));
        assert!(index.is_empty());
    }
}
