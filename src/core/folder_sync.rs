//! 文件夹层同步：识别整体移动/重命名的文件夹，补齐缺失的文件夹，清理多余的文件夹

use crate::core::error::{Result, SyncError};
use crate::core::matcher::{MatchOutcome, MatchStrategy};
use crate::core::operator::{FileOperator, FolderOperator};
use crate::core::stats::SyncStats;
use crate::storage::{reroot, FileSystem};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// 一次文件夹同步的工作集
///
/// 目标侧文件夹集合在移动后会整体改写路径，后续判断始终基于移动后的位置。
#[derive(Debug, Default)]
pub struct ReconcileSession {
    dest_folders: HashSet<PathBuf>,
    processed: HashSet<PathBuf>,
    moved: HashMap<PathBuf, PathBuf>,
}

impl ReconcileSession {
    pub fn new(dest_folders: impl IntoIterator<Item = PathBuf>) -> Self {
        Self {
            dest_folders: dest_folders.into_iter().collect(),
            ..Default::default()
        }
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.dest_folders.contains(path)
    }

    pub fn is_processed(&self, path: &Path) -> bool {
        self.processed.contains(path)
    }

    pub fn mark_processed(&mut self, path: &Path) {
        self.processed.insert(path.to_path_buf());
    }

    /// 新建的子树：根目录和其下所有文件夹都视为已处理
    pub fn add_subtree(&mut self, root: &Path, descendants: impl IntoIterator<Item = PathBuf>) {
        for path in std::iter::once(root.to_path_buf()).chain(descendants) {
            self.dest_folders.insert(path.clone());
            self.processed.insert(path);
        }
    }

    /// 记录一次文件夹移动，并改写其下所有已知路径
    pub fn record_move(&mut self, from: &Path, to: &Path) {
        let rewrite = |path: PathBuf| match path.strip_prefix(from) {
            Ok(rest) if rest.as_os_str().is_empty() => to.to_path_buf(),
            Ok(rest) => to.join(rest),
            Err(_) => path,
        };

        self.dest_folders = self.dest_folders.drain().map(rewrite).collect();
        self.processed = self.processed.drain().map(rewrite).collect();
        self.moved = self
            .moved
            .drain()
            .map(|(old, new)| (old, rewrite(new)))
            .collect();
        self.moved.insert(from.to_path_buf(), to.to_path_buf());
    }

    /// 已记录的移动：旧路径 -> 当前路径
    pub fn moved(&self) -> &HashMap<PathBuf, PathBuf> {
        &self.moved
    }

    /// 尚未处理的目标文件夹，按路径排序
    pub fn unprocessed(&self) -> Vec<PathBuf> {
        let mut list: Vec<PathBuf> = self
            .dest_folders
            .iter()
            .filter(|p| !self.processed.contains(*p))
            .cloned()
            .collect();
        list.sort();
        list
    }

    /// 所有目标文件夹，深的在前
    pub fn deepest_first(&self) -> Vec<PathBuf> {
        let mut list: Vec<PathBuf> = self.dest_folders.iter().cloned().collect();
        list.sort_by(|a, b| {
            depth(b)
                .cmp(&depth(a))
                .then_with(|| b.as_os_str().len().cmp(&a.as_os_str().len()))
                .then_with(|| a.cmp(b))
        });
        list
    }
}

fn depth(path: &Path) -> usize {
    path.components().count()
}

/// 文件夹同步器
pub struct FolderSynchronizer {
    fs: Arc<dyn FileSystem>,
    matcher: Arc<MatchStrategy>,
    files: Arc<FileOperator>,
    folders: Arc<FolderOperator>,
}

impl FolderSynchronizer {
    pub fn new(
        fs: Arc<dyn FileSystem>,
        matcher: Arc<MatchStrategy>,
        files: Arc<FileOperator>,
        folders: Arc<FolderOperator>,
    ) -> Self {
        Self {
            fs,
            matcher,
            files,
            folders,
        }
    }

    /// 让目标侧的文件夹结构与源侧一致
    ///
    /// 单个文件夹的复制/移动失败只记录日志并跳过，由后续的文件同步补齐。
    pub async fn synchronize(
        &self,
        source: &Path,
        destination: &Path,
        stats: &mut SyncStats,
    ) -> Result<()> {
        let mut source_folders = self.fs.list_all_folders(source).await?;
        source_folders.sort_by(|a, b| depth(a).cmp(&depth(b)).then_with(|| a.cmp(b)));
        let dest_folders = self.fs.list_all_folders(destination).await?;
        info!(
            "文件夹扫描完成: 源 {} 个, 目标 {} 个",
            source_folders.len(),
            dest_folders.len()
        );

        let source_set: HashSet<PathBuf> = source_folders.iter().cloned().collect();
        let mut session = ReconcileSession::new(dest_folders);

        for source_folder in &source_folders {
            let expected = reroot(source_folder, source, destination).ok_or_else(|| {
                SyncError::InvalidArgument(format!("{} 不在源目录下", source_folder.display()))
            })?;

            if session.contains(&expected) {
                session.mark_processed(&expected);
                continue;
            }

            if let Err(e) = self
                .reconcile_missing(
                    source_folder,
                    &expected,
                    source,
                    destination,
                    &source_set,
                    &mut session,
                    stats,
                )
                .await
            {
                error!("同步文件夹失败，跳过: {}: {}", source_folder.display(), e);
            }
        }

        if !session.moved().is_empty() {
            info!("本次识别到 {} 个文件夹移动", session.moved().len());
        }

        self.delete_orphans(source, destination, &mut session, stats)
            .await;
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn reconcile_missing(
        &self,
        source_folder: &Path,
        expected: &Path,
        source: &Path,
        destination: &Path,
        source_set: &HashSet<PathBuf>,
        session: &mut ReconcileSession,
        stats: &mut SyncStats,
    ) -> Result<()> {
        // 源侧是文件夹而目标侧同名位置是文件
        if self.files.delete(expected).await? {
            debug!("删除与文件夹同名的文件: {}", expected.display());
            stats.files_deleted += 1;
        }

        // 移动之后不再访问源文件夹，避免移动成功却没记入会话
        let direct_files = self.fs.list_files(source_folder).await?.len() as u64;
        let has_content = direct_files > 0 || !self.fs.list_dirs(source_folder).await?.is_empty();

        if has_content {
            for candidate in session.unprocessed() {
                // 源侧有同路径文件夹的候选应留在原处
                let in_place = reroot(&candidate, destination, source)
                    .map(|counterpart| source_set.contains(&counterpart))
                    .unwrap_or(false);
                if in_place || expected.starts_with(&candidate) {
                    continue;
                }

                match self
                    .matcher
                    .match_folder(source_folder, &candidate, source, destination)
                    .await
                {
                    MatchOutcome::Match => match self.folders.move_dir(&candidate, expected).await {
                        Ok(()) => {
                            info!(
                                "识别到文件夹移动: {} -> {} ({} 个文件)",
                                candidate.display(),
                                expected.display(),
                                direct_files
                            );
                            session.record_move(&candidate, expected);
                            session.mark_processed(expected);
                            stats.folders_moved += 1;
                            stats.files_in_moved_folders += direct_files;
                            return Ok(());
                        }
                        Err(e) => {
                            warn!("移动文件夹失败，改为复制: {}: {}", candidate.display(), e);
                            break;
                        }
                    },
                    MatchOutcome::NoMatch | MatchOutcome::Indeterminate(_) => {}
                }
            }
        }

        let copied = self.folders.copy(source_folder, expected, true, false).await?;
        debug!("复制文件夹: {} ({} 个文件)", expected.display(), copied);
        let created = self.fs.list_all_folders(expected).await?;
        session.add_subtree(expected, created);
        stats.folders_changed += 1;
        stats.files_changed += copied;
        Ok(())
    }

    /// 删除源侧没有对应项的目标文件夹
    ///
    /// 由深到浅检查；祖先也要删除的文件夹跟随祖先一起删除，只计一次。
    async fn delete_orphans(
        &self,
        source: &Path,
        destination: &Path,
        session: &mut ReconcileSession,
        stats: &mut SyncStats,
    ) {
        let mut doomed = HashSet::new();
        for folder in session.deepest_first() {
            if session.is_processed(&folder) {
                continue;
            }
            let Some(counterpart) = reroot(&folder, destination, source) else {
                continue;
            };
            if self.fs.dir_exists(&counterpart).await {
                session.mark_processed(&folder);
                continue;
            }
            doomed.insert(folder);
        }

        for folder in session.deepest_first() {
            if !doomed.contains(&folder) {
                continue;
            }
            let covered = folder
                .ancestors()
                .skip(1)
                .any(|ancestor| doomed.contains(ancestor));
            if covered {
                session.mark_processed(&folder);
                continue;
            }

            match self.folders.delete(&folder, true).await {
                Ok(true) => {
                    debug!("删除多余文件夹: {}", folder.display());
                    stats.folders_deleted += 1;
                    session.mark_processed(&folder);
                }
                Ok(false) => session.mark_processed(&folder),
                Err(e) => error!("删除文件夹失败，跳过: {}: {}", folder.display(), e),
            }
        }
    }
}
