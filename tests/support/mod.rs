//! 集成测试共用的工具

#![allow(dead_code)]

use async_trait::async_trait;
use dirmirror::config::{MirrorConfig, RetryConfig};
use dirmirror::storage::{DirStat, FileStat, FileSystem, FsError, FsResult, LocalFileSystem};
use dirmirror::SyncEngine;
use filetime::FileTime;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;

/// 包装本地文件系统，记录复制/移动次数，并可注入瞬时错误
#[derive(Default)]
pub struct RecordingFs {
    inner: LocalFileSystem,
    pub copies: AtomicUsize,
    pub file_moves: AtomicUsize,
    pub dir_moves: AtomicUsize,
    /// 接下来这么多次 copy_file 返回瞬时错误
    pub failing_copies: AtomicUsize,
    /// 接下来这么多次 move_file 返回瞬时错误
    pub failing_moves: AtomicUsize,
    /// 接下来这么多次 move_dir 返回瞬时错误
    pub failing_dir_moves: AtomicUsize,
    /// 读取这些文件总是失败
    unreadable: Mutex<HashSet<PathBuf>>,
    pub failed_reads: AtomicUsize,
    /// 发生过文件夹移动之后，列出这些文件夹的文件会失败
    vanish_after_dir_move: Mutex<HashSet<PathBuf>>,
}

fn take_one(counter: &AtomicUsize) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

fn locked(path: &Path) -> FsError {
    FsError::Io {
        path: path.to_path_buf(),
        source: io::Error::other("file is locked"),
    }
}

impl RecordingFs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn copies(&self) -> usize {
        self.copies.load(Ordering::SeqCst)
    }

    pub fn file_moves(&self) -> usize {
        self.file_moves.load(Ordering::SeqCst)
    }

    pub fn dir_moves(&self) -> usize {
        self.dir_moves.load(Ordering::SeqCst)
    }

    pub fn make_unreadable(&self, path: &Path) {
        self.unreadable.lock().unwrap().insert(path.to_path_buf());
    }

    pub fn vanish_after_dir_move(&self, path: &Path) {
        self.vanish_after_dir_move
            .lock()
            .unwrap()
            .insert(path.to_path_buf());
    }

    fn check_readable(&self, path: &Path) -> FsResult<()> {
        if self.unreadable.lock().unwrap().contains(path) {
            self.failed_reads.fetch_add(1, Ordering::SeqCst);
            return Err(locked(path));
        }
        Ok(())
    }

    pub fn reset(&self) {
        self.copies.store(0, Ordering::SeqCst);
        self.file_moves.store(0, Ordering::SeqCst);
        self.dir_moves.store(0, Ordering::SeqCst);
        self.failed_reads.store(0, Ordering::SeqCst);
    }
}

#[async_trait]
impl FileSystem for RecordingFs {
    async fn file_exists(&self, path: &Path) -> bool {
        self.inner.file_exists(path).await
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        self.inner.dir_exists(path).await
    }

    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        self.check_readable(path)?;
        self.inner.read(path).await
    }

    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> FsResult<Vec<u8>> {
        self.check_readable(path)?;
        self.inner.read_range(path, offset, length).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        self.inner.write(path, data).await
    }

    async fn copy_file(&self, from: &Path, to: &Path, overwrite: bool) -> FsResult<()> {
        self.copies.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_copies) {
            return Err(locked(from));
        }
        self.inner.copy_file(from, to, overwrite).await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.file_moves.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_moves) {
            return Err(locked(from));
        }
        self.inner.move_file(from, to).await
    }

    async fn delete_file(&self, path: &Path) -> FsResult<()> {
        self.inner.delete_file(path).await
    }

    async fn create_dir(&self, path: &Path) -> FsResult<()> {
        self.inner.create_dir(path).await
    }

    async fn delete_dir(&self, path: &Path, recursive: bool) -> FsResult<()> {
        self.inner.delete_dir(path, recursive).await
    }

    async fn move_dir(&self, from: &Path, to: &Path) -> FsResult<()> {
        self.dir_moves.fetch_add(1, Ordering::SeqCst);
        if take_one(&self.failing_dir_moves) {
            return Err(locked(from));
        }
        self.inner.move_dir(from, to).await
    }

    async fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        let vanished = self.vanish_after_dir_move.lock().unwrap().contains(dir);
        if vanished && self.dir_moves() > 0 {
            return Err(FsError::NotFound(dir.to_path_buf()));
        }
        self.inner.list_files(dir).await
    }

    async fn list_dirs(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_dirs(dir).await
    }

    async fn stat_file(&self, path: &Path) -> FsResult<FileStat> {
        self.inner.stat_file(path).await
    }

    async fn stat_dir(&self, path: &Path) -> FsResult<DirStat> {
        self.inner.stat_dir(path).await
    }

    async fn list_all_files(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_all_files(root).await
    }

    async fn list_all_folders(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        self.inner.list_all_folders(root).await
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// 源/目标目录放在同一个临时目录下
pub struct Fixture {
    _dir: TempDir,
    pub source: PathBuf,
    pub destination: PathBuf,
}

impl Fixture {
    pub fn new() -> Self {
        let dir = TempDir::new().unwrap();
        let source = dir.path().join("source");
        let destination = dir.path().join("destination");
        std::fs::create_dir_all(&source).unwrap();
        Self {
            _dir: dir,
            source,
            destination,
        }
    }

    pub fn src(&self, relative: &str) -> PathBuf {
        self.source.join(relative)
    }

    pub fn dst(&self, relative: &str) -> PathBuf {
        self.destination.join(relative)
    }
}

/// 写文件并设置确定的修改时间，避免时间戳粒度导致的巧合
pub fn write_file(path: &Path, data: &[u8], mtime_secs: i64) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, data).unwrap();
    filetime::set_file_mtime(path, FileTime::from_unix_time(mtime_secs, 0)).unwrap();
}

pub fn mtime(path: &Path) -> FileTime {
    FileTime::from_last_modification_time(&std::fs::metadata(path).unwrap())
}

pub fn engine(fs: Arc<RecordingFs>) -> SyncEngine {
    SyncEngine::with_config(
        fs,
        MirrorConfig {
            retry: RetryConfig::immediate(3),
            ..MirrorConfig::default()
        },
    )
}

/// 目录树下所有条目的相对路径（目录以 / 结尾），排好序
pub fn tree(root: &Path) -> Vec<String> {
    let mut entries: Vec<String> = walkdir::WalkDir::new(root)
        .min_depth(1)
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry
                .path()
                .strip_prefix(root)
                .unwrap()
                .to_string_lossy()
                .replace('\\', "/");
            if entry.file_type().is_dir() {
                format!("{}/", relative)
            } else {
                relative
            }
        })
        .collect();
    entries.sort();
    entries
}

/// 断言目标与源的结构、内容、修改时间完全一致
pub fn assert_mirrored(fixture: &Fixture) {
    let source_tree = tree(&fixture.source);
    assert_eq!(source_tree, tree(&fixture.destination));
    for relative in source_tree.iter().filter(|p| !p.ends_with('/')) {
        let src = fixture.src(relative);
        let dst = fixture.dst(relative);
        assert_eq!(std::fs::read(&src).unwrap(), std::fs::read(&dst).unwrap(), "{}", relative);
        assert_eq!(mtime(&src), mtime(&dst), "{}", relative);
    }
}
