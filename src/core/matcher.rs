//! 移动/重命名识别：判断只存在于一侧的条目是否对应另一侧另一位置的同一条目

use crate::config::MatchConfig;
use crate::core::comparator::FileComparator;
use crate::storage::{reroot, FileSystem, FsError, FsResult};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 匹配结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MatchOutcome {
    /// 是同一条目，应移动而不是复制
    Match,
    /// 确定不是同一条目
    NoMatch,
    /// 检查过程中出错，无法判断
    Indeterminate(String),
}

impl MatchOutcome {
    fn from_bool(matched: bool) -> Self {
        if matched {
            MatchOutcome::Match
        } else {
            MatchOutcome::NoMatch
        }
    }
}

/// 文件夹的直接文件概况（不递归）
#[derive(Debug, Clone, Default)]
pub struct FolderProfile {
    pub file_sizes: Vec<u64>,
    pub creation_time_utc: Option<DateTime<Utc>>,
}

/// 匹配策略
pub struct MatchStrategy {
    fs: Arc<dyn FileSystem>,
    comparator: Arc<FileComparator>,
    config: MatchConfig,
}

impl MatchStrategy {
    pub fn new(fs: Arc<dyn FileSystem>, comparator: Arc<FileComparator>) -> Self {
        Self::with_config(fs, comparator, MatchConfig::default())
    }

    pub fn with_config(
        fs: Arc<dyn FileSystem>,
        comparator: Arc<FileComparator>,
        config: MatchConfig,
    ) -> Self {
        Self {
            fs,
            comparator,
            config,
        }
    }

    /// 目标侧的 `dest_file` 是否就是源侧 `source_file` 被移动/重命名后的旧副本
    pub async fn match_file(
        &self,
        source_file: &Path,
        dest_file: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> MatchOutcome {
        match self
            .try_match_file(source_file, dest_file, source_root, dest_root)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!(
                    "文件匹配检查失败: {} <-> {}: {}",
                    source_file.display(),
                    dest_file.display(),
                    e
                );
                MatchOutcome::Indeterminate(e.to_string())
            }
        }
    }

    async fn try_match_file(
        &self,
        source_file: &Path,
        dest_file: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> FsResult<MatchOutcome> {
        if !self.fs.file_exists(source_file).await || !self.fs.file_exists(dest_file).await {
            return Ok(MatchOutcome::NoMatch);
        }

        // 源文件对应位置已有文件，说明它不需要从别处移过来
        let expected = expected_path(source_file, source_root, dest_root)?;
        if self.fs.file_exists(&expected).await {
            return Ok(MatchOutcome::NoMatch);
        }

        let identical = self.comparator.try_identical(source_file, dest_file).await?;
        Ok(MatchOutcome::from_bool(identical))
    }

    /// 目标侧的 `dest_folder` 是否就是源侧 `source_folder` 被移动/重命名后的旧副本
    pub async fn match_folder(
        &self,
        source_folder: &Path,
        dest_folder: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> MatchOutcome {
        match self
            .try_match_folder(source_folder, dest_folder, source_root, dest_root)
            .await
        {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    "文件夹匹配检查失败: {} <-> {}: {}",
                    source_folder.display(),
                    dest_folder.display(),
                    e
                );
                MatchOutcome::Indeterminate(e.to_string())
            }
        }
    }

    async fn try_match_folder(
        &self,
        source_folder: &Path,
        dest_folder: &Path,
        source_root: &Path,
        dest_root: &Path,
    ) -> FsResult<MatchOutcome> {
        if !self.fs.dir_exists(source_folder).await || !self.fs.dir_exists(dest_folder).await {
            return Ok(MatchOutcome::NoMatch);
        }

        let expected = expected_path(source_folder, source_root, dest_root)?;
        if self.fs.dir_exists(&expected).await {
            return Ok(MatchOutcome::NoMatch);
        }

        let source = self.profile(source_folder).await?;
        let dest = self.profile(dest_folder).await?;
        let matched = self.folders_match(&source, &dest);

        debug!(
            "文件夹匹配: {} ({} 个文件) <-> {} ({} 个文件): {}",
            source_folder.display(),
            source.file_sizes.len(),
            dest_folder.display(),
            dest.file_sizes.len(),
            matched
        );
        Ok(MatchOutcome::from_bool(matched))
    }

    async fn profile(&self, folder: &Path) -> FsResult<FolderProfile> {
        let creation_time_utc = self.fs.stat_dir(folder).await?.creation_time_utc;
        let mut file_sizes = Vec::new();
        for file in self.fs.list_files(folder).await? {
            file_sizes.push(self.fs.stat_file(&file).await?.size);
        }
        Ok(FolderProfile {
            file_sizes,
            creation_time_utc,
        })
    }

    /// 两个创建时间是否足够接近；任一侧缺失时不算接近
    pub fn creation_matched(
        &self,
        a: Option<DateTime<Utc>>,
        b: Option<DateTime<Utc>>,
    ) -> bool {
        match (a, b) {
            (Some(a), Some(b)) => {
                (a - b).num_seconds().abs() <= self.config.creation_tolerance_secs
            }
            _ => false,
        }
    }

    /// 文件夹匹配的启发式规则
    ///
    /// 按文件大小求交集会把大小相同的不同文件算作匹配，这里接受这种误判，
    /// 以换取少做整个文件夹的重复复制。
    pub fn folders_match(&self, source: &FolderProfile, dest: &FolderProfile) -> bool {
        let creation_matched = self.creation_matched(source.creation_time_utc, dest.creation_time_utc);
        let source_count = source.file_sizes.len();
        let dest_count = dest.file_sizes.len();
        let count_diff = source_count.abs_diff(dest_count);

        if count_diff > self.config.file_count_tolerance && !creation_matched {
            return false;
        }
        if count_diff <= self.config.file_count_tolerance && creation_matched {
            return true;
        }
        if source_count == 0 && dest_count == 0 {
            return creation_matched;
        }

        let common = size_intersection(&source.file_sizes, &dest.file_sizes);
        (source_count > 0 && common * 2 >= source_count) || (creation_matched && common > 0)
    }
}

/// 按大小的多重集交集元素个数
fn size_intersection(source: &[u64], dest: &[u64]) -> usize {
    let mut available: HashMap<u64, usize> = HashMap::new();
    for size in dest {
        *available.entry(*size).or_insert(0) += 1;
    }

    let mut common = 0;
    for size in source {
        if let Some(count) = available.get_mut(size) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    common
}

fn expected_path(path: &Path, source_root: &Path, dest_root: &Path) -> FsResult<std::path::PathBuf> {
    reroot(path, source_root, dest_root).ok_or_else(|| {
        FsError::InvalidArgument(format!(
            "{} 不在 {} 之下",
            path.display(),
            source_root.display()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::LocalFileSystem;
    use chrono::Duration;
    use tempfile::TempDir;

    fn strategy() -> MatchStrategy {
        let fs: Arc<dyn FileSystem> = Arc::new(LocalFileSystem::new());
        let comparator = Arc::new(FileComparator::new(fs.clone()));
        MatchStrategy::new(fs, comparator)
    }

    fn profile(sizes: &[u64], created: Option<DateTime<Utc>>) -> FolderProfile {
        FolderProfile {
            file_sizes: sizes.to_vec(),
            creation_time_utc: created,
        }
    }

    #[test]
    fn test_size_intersection_is_multiset() {
        assert_eq!(size_intersection(&[1, 1, 2], &[1, 2, 2]), 2);
        assert_eq!(size_intersection(&[5, 5, 5], &[5]), 1);
        assert_eq!(size_intersection(&[], &[1]), 0);
    }

    #[test]
    fn test_creation_tolerance() {
        let s = strategy();
        let now = Utc::now();
        assert!(s.creation_matched(Some(now), Some(now + Duration::seconds(299))));
        assert!(!s.creation_matched(Some(now), Some(now - Duration::seconds(301))));
        assert!(!s.creation_matched(Some(now), None));
    }

    #[test]
    fn test_folder_rules() {
        let s = strategy();
        let now = Utc::now();
        let long_ago = now - Duration::days(30);

        // 数量相近且同时创建
        assert!(s.folders_match(&profile(&[1, 2, 3], Some(now)), &profile(&[9], Some(now))));
        // 数量差距大且创建时间不同
        assert!(!s.folders_match(
            &profile(&[1, 2, 3, 4, 5], Some(now)),
            &profile(&[1], Some(long_ago))
        ));
        // 两边都为空，只看创建时间
        assert!(!s.folders_match(&profile(&[], Some(now)), &profile(&[], Some(long_ago))));
        // 一半以上大小相同
        assert!(s.folders_match(
            &profile(&[10, 20, 30, 40], Some(now)),
            &profile(&[10, 20, 99, 98], Some(long_ago))
        ));
        // 不足一半
        assert!(!s.folders_match(
            &profile(&[10, 20, 30, 40], Some(now)),
            &profile(&[10, 97, 99, 98], None)
        ));
        // 数量差距大但同时创建，有交集即可
        assert!(s.folders_match(
            &profile(&[10, 1, 2, 3, 4, 5], Some(now)),
            &profile(&[10], Some(now))
        ));
        // 源文件夹没有直接文件时不靠交集规则匹配
        assert!(!s.folders_match(&profile(&[], None), &profile(&[7], None)));
    }

    #[tokio::test]
    async fn test_match_file_identical_elsewhere() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("new.txt"), b"same bytes").unwrap();
        std::fs::write(dst.path().join("old.txt"), b"same bytes").unwrap();
        std::fs::write(dst.path().join("other.txt"), b"diff bytes").unwrap();
        filetime::set_file_mtime(
            dst.path().join("other.txt"),
            filetime::FileTime::from_unix_time(1_000, 0),
        )
        .unwrap();

        let s = strategy();
        let outcome = s
            .match_file(
                &src.path().join("new.txt"),
                &dst.path().join("old.txt"),
                src.path(),
                dst.path(),
            )
            .await;
        assert_eq!(outcome, MatchOutcome::Match);

        let outcome = s
            .match_file(
                &src.path().join("new.txt"),
                &dst.path().join("other.txt"),
                src.path(),
                dst.path(),
            )
            .await;
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_match_file_rejected_when_expected_path_taken() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        std::fs::write(src.path().join("a.txt"), b"content").unwrap();
        std::fs::write(dst.path().join("a.txt"), b"content").unwrap();
        std::fs::write(dst.path().join("b.txt"), b"content").unwrap();

        let outcome = strategy()
            .match_file(
                &src.path().join("a.txt"),
                &dst.path().join("b.txt"),
                src.path(),
                dst.path(),
            )
            .await;
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }

    #[tokio::test]
    async fn test_match_file_outside_root_is_indeterminate() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        let other = TempDir::new().unwrap();
        std::fs::write(other.path().join("x"), b"1").unwrap();
        std::fs::write(dst.path().join("x"), b"1").unwrap();

        let outcome = strategy()
            .match_file(
                &other.path().join("x"),
                &dst.path().join("x"),
                src.path(),
                dst.path(),
            )
            .await;
        assert!(matches!(outcome, MatchOutcome::Indeterminate(_)));
    }

    #[tokio::test]
    async fn test_match_renamed_folder() {
        let src = TempDir::new().unwrap();
        let dst = TempDir::new().unwrap();
        for (name, data) in [("f1", "one"), ("f2", "two!"), ("f3", "three")] {
            std::fs::create_dir_all(src.path().join("Proj")).unwrap();
            std::fs::create_dir_all(dst.path().join("OldProj")).unwrap();
            std::fs::write(src.path().join("Proj").join(name), data).unwrap();
            std::fs::write(dst.path().join("OldProj").join(name), data).unwrap();
        }

        let s = strategy();
        let outcome = s
            .match_folder(
                &src.path().join("Proj"),
                &dst.path().join("OldProj"),
                src.path(),
                dst.path(),
            )
            .await;
        assert_eq!(outcome, MatchOutcome::Match);

        // 目标位置已存在同名文件夹
        std::fs::create_dir_all(dst.path().join("Proj")).unwrap();
        let outcome = s
            .match_folder(
                &src.path().join("Proj"),
                &dst.path().join("OldProj"),
                src.path(),
                dst.path(),
            )
            .await;
        assert_eq!(outcome, MatchOutcome::NoMatch);
    }
}
