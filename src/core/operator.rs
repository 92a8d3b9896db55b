//! 文件/文件夹操作：参数校验、前置检查、瞬时错误重试

use crate::config::RetryConfig;
use crate::core::comparator::FileComparator;
use crate::storage::{FileSystem, FsError, FsResult};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// 带重试的操作执行，只重试瞬时 I/O 错误
pub async fn with_retry<T, F, Fut>(
    retry: &RetryConfig,
    operation: &str,
    path: &Path,
    mut f: F,
) -> FsResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = FsResult<T>>,
{
    let max_attempts = retry.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match f().await {
            Ok(value) => {
                if attempt > 1 {
                    debug!("{} 第 {} 次尝试成功: {}", operation, attempt, path.display());
                }
                return Ok(value);
            }
            Err(e) if e.is_transient() && attempt < max_attempts => {
                warn!(
                    "{} 失败，{}ms 后重试 ({}/{}): {}",
                    operation, retry.delay_ms, attempt, max_attempts, e
                );
                if retry.delay_ms > 0 {
                    tokio::time::sleep(retry.delay()).await;
                }
                attempt += 1;
            }
            Err(e) => {
                if e.is_transient() {
                    error!("{} 最终失败 (已尝试{}次): {}", operation, attempt, e);
                }
                return Err(e);
            }
        }
    }
}

fn validate_path(path: &Path, what: &str) -> FsResult<()> {
    if path.as_os_str().is_empty() {
        return Err(FsError::InvalidArgument(format!("{} 路径为空", what)));
    }
    Ok(())
}

/// 校验新名称并返回同目录下的新路径
fn renamed_path(path: &Path, new_name: &str) -> FsResult<PathBuf> {
    let new_name = new_name.trim();
    if new_name.is_empty() {
        return Err(FsError::InvalidArgument("新名称为空".to_string()));
    }
    if new_name.contains(['/', '\\']) {
        return Err(FsError::InvalidArgument(format!("新名称不能包含路径分隔符: {}", new_name)));
    }
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(new_name))
}

/// 文件复制结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyOutcome {
    Copied,
    /// 目标已存在且内容相同，未复制
    Skipped,
}

/// 文件操作器
pub struct FileOperator {
    fs: Arc<dyn FileSystem>,
    comparator: Arc<FileComparator>,
    retry: RetryConfig,
}

impl FileOperator {
    pub fn new(fs: Arc<dyn FileSystem>, comparator: Arc<FileComparator>, retry: RetryConfig) -> Self {
        Self {
            fs,
            comparator,
            retry,
        }
    }

    /// 复制文件；覆盖时若目标内容相同则跳过
    pub async fn copy(&self, from: &Path, to: &Path, overwrite: bool) -> FsResult<CopyOutcome> {
        validate_path(from, "源")?;
        validate_path(to, "目标")?;

        if !self.fs.file_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }

        if self.fs.file_exists(to).await {
            if !overwrite {
                return Err(FsError::AlreadyExists(to.to_path_buf()));
            }
            if self.comparator.are_identical(from, to).await {
                debug!("文件相同，跳过复制: {}", to.display());
                return Ok(CopyOutcome::Skipped);
            }
        }

        self.ensure_parent(to).await?;

        let fs = self.fs.as_ref();
        with_retry(&self.retry, "复制文件", from, move || fs.copy_file(from, to, overwrite)).await?;
        debug!("复制: {} -> {}", from.display(), to.display());
        Ok(CopyOutcome::Copied)
    }

    /// 移动文件；覆盖时先删除已存在的目标
    pub async fn move_file(&self, from: &Path, to: &Path, overwrite: bool) -> FsResult<()> {
        validate_path(from, "源")?;
        validate_path(to, "目标")?;

        if !self.fs.file_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }

        if self.fs.file_exists(to).await {
            if !overwrite {
                return Err(FsError::AlreadyExists(to.to_path_buf()));
            }
            self.delete(to).await?;
        }

        self.ensure_parent(to).await?;

        let fs = self.fs.as_ref();
        with_retry(&self.retry, "移动文件", from, move || fs.move_file(from, to)).await?;
        debug!("移动: {} -> {}", from.display(), to.display());
        Ok(())
    }

    /// 删除文件，不存在时什么都不做；返回是否真的删除了
    pub async fn delete(&self, path: &Path) -> FsResult<bool> {
        validate_path(path, "文件")?;

        if !self.fs.file_exists(path).await {
            return Ok(false);
        }

        let fs = self.fs.as_ref();
        with_retry(&self.retry, "删除文件", path, move || fs.delete_file(path)).await?;
        debug!("删除文件: {}", path.display());
        Ok(true)
    }

    /// 在同一目录下重命名，返回新路径
    pub async fn rename(&self, path: &Path, new_name: &str) -> FsResult<PathBuf> {
        validate_path(path, "文件")?;
        let target = renamed_path(path, new_name)?;
        self.move_file(path, &target, false).await?;
        Ok(target)
    }

    async fn ensure_parent(&self, path: &Path) -> FsResult<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !self.fs.dir_exists(parent).await {
                let fs = self.fs.as_ref();
                with_retry(&self.retry, "创建目录", parent, move || fs.create_dir(parent)).await?;
            }
        }
        Ok(())
    }
}

/// 文件夹操作器
pub struct FolderOperator {
    fs: Arc<dyn FileSystem>,
    retry: RetryConfig,
}

impl FolderOperator {
    pub fn new(fs: Arc<dyn FileSystem>, retry: RetryConfig) -> Self {
        Self { fs, retry }
    }

    /// 创建文件夹（含父目录），已存在时什么都不做
    pub async fn create(&self, path: &Path) -> FsResult<()> {
        validate_path(path, "文件夹")?;
        if self.fs.dir_exists(path).await {
            return Ok(());
        }
        let fs = self.fs.as_ref();
        with_retry(&self.retry, "创建目录", path, move || fs.create_dir(path)).await
    }

    /// 复制文件夹，返回复制的文件数
    ///
    /// 非递归时只复制直接文件；覆盖时先清空目标。
    pub async fn copy(&self, from: &Path, to: &Path, recursive: bool, overwrite: bool) -> FsResult<u64> {
        validate_path(from, "源")?;
        validate_path(to, "目标")?;

        if !self.fs.dir_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }

        if self.fs.dir_exists(to).await {
            if !overwrite {
                return Err(FsError::AlreadyExists(to.to_path_buf()));
            }
            self.delete(to, true).await?;
        }

        let fs = self.fs.as_ref();
        let mut copied = 0u64;
        let mut pending = vec![(from.to_path_buf(), to.to_path_buf())];

        while let Some((src_dir, dst_dir)) = pending.pop() {
            self.create(&dst_dir).await?;

            for file in fs.list_files(&src_dir).await? {
                let Some(name) = file.file_name() else {
                    continue;
                };
                let target = dst_dir.join(name);
                let (file, target) = (file.as_path(), target.as_path());
                with_retry(&self.retry, "复制文件", file, move || fs.copy_file(file, target, false))
                    .await?;
                copied += 1;
            }

            if recursive {
                for sub in fs.list_dirs(&src_dir).await? {
                    if let Some(name) = sub.file_name() {
                        let target = dst_dir.join(name);
                        pending.push((sub, target));
                    }
                }
            }
        }

        debug!("复制文件夹: {} -> {} ({} 个文件)", from.display(), to.display(), copied);
        Ok(copied)
    }

    /// 删除文件夹，不存在时什么都不做；非递归删除非空目录是永久错误
    pub async fn delete(&self, path: &Path, recursive: bool) -> FsResult<bool> {
        validate_path(path, "文件夹")?;

        if !self.fs.dir_exists(path).await {
            return Ok(false);
        }

        let fs = self.fs.as_ref();
        with_retry(&self.retry, "删除目录", path, move || fs.delete_dir(path, recursive)).await?;
        debug!("删除文件夹: {}", path.display());
        Ok(true)
    }

    /// 移动文件夹，自动创建目标的父目录
    pub async fn move_dir(&self, from: &Path, to: &Path) -> FsResult<()> {
        validate_path(from, "源")?;
        validate_path(to, "目标")?;

        if !self.fs.dir_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }
        if self.fs.dir_exists(to).await || self.fs.file_exists(to).await {
            return Err(FsError::AlreadyExists(to.to_path_buf()));
        }

        if let Some(parent) = to.parent() {
            if !parent.as_os_str().is_empty() {
                self.create(parent).await?;
            }
        }

        let fs = self.fs.as_ref();
        with_retry(&self.retry, "移动目录", from, move || fs.move_dir(from, to)).await?;
        debug!("移动文件夹: {} -> {}", from.display(), to.display());
        Ok(())
    }

    /// 在同一目录下重命名，返回新路径
    pub async fn rename(&self, path: &Path, new_name: &str) -> FsResult<PathBuf> {
        validate_path(path, "文件夹")?;
        let target = renamed_path(path, new_name)?;
        self.move_dir(path, &target).await?;
        Ok(target)
    }
}
