use super::{DirStat, FileStat, FileSystem, FsError, FsResult};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use filetime::FileTime;
use std::fs::Metadata;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use walkdir::WalkDir;

/// 本地文件系统实现
pub struct LocalFileSystem {
    name: String,
}

impl LocalFileSystem {
    pub fn new() -> Self {
        Self {
            name: "local".to_string(),
        }
    }

    /// 在阻塞线程池上执行同步文件操作
    async fn blocking<T, F>(path: &Path, f: F) -> FsResult<T>
    where
        T: Send + 'static,
        F: FnOnce() -> FsResult<T> + Send + 'static,
    {
        tokio::task::spawn_blocking(f)
            .await
            .map_err(|e| FsError::Io {
                path: path.to_path_buf(),
                source: io::Error::other(e),
            })?
    }

    fn to_utc(time: std::time::SystemTime) -> DateTime<Utc> {
        DateTime::<Utc>::from(time)
    }

    fn file_stat(metadata: &Metadata, path: &Path) -> FsResult<FileStat> {
        let modified = metadata
            .modified()
            .map_err(|e| FsError::from_io(path, e))?;
        Ok(FileStat {
            size: metadata.len(),
            last_write_time_utc: Self::to_utc(modified),
            creation_time_utc: metadata.created().ok().map(Self::to_utc),
        })
    }

    /// 把源文件的时间戳写到目标文件上
    fn preserve_times(source: &Metadata, dest: &Path) -> io::Result<()> {
        filetime::set_file_times(
            dest,
            FileTime::from_last_access_time(source),
            FileTime::from_last_modification_time(source),
        )?;

        #[cfg(windows)]
        {
            use std::os::windows::fs::FileTimesExt;
            if let Ok(created) = source.created() {
                let times = std::fs::FileTimes::new().set_created(created);
                std::fs::OpenOptions::new()
                    .write(true)
                    .open(dest)?
                    .set_times(times)?;
            }
        }

        Ok(())
    }

    /// 递归遍历；任何读取失败都让整个遍历失败，不能返回残缺的快照
    fn walk(root: &Path, want_dirs: bool) -> FsResult<Vec<PathBuf>> {
        let mut paths = Vec::new();
        let entries = WalkDir::new(root)
            .min_depth(1)
            .follow_links(false)
            .sort_by_file_name();
        for entry in entries {
            let entry = entry.map_err(|e| Self::walk_error(root, e))?;
            // 符号链接不跟随，也不同步
            let file_type = entry.file_type();
            let wanted = if want_dirs {
                file_type.is_dir()
            } else {
                file_type.is_file()
            };
            if wanted {
                paths.push(entry.into_path());
            }
        }
        Ok(paths)
    }

    fn walk_error(root: &Path, err: walkdir::Error) -> FsError {
        let path = err.path().unwrap_or(root).to_path_buf();
        match err.into_io_error() {
            Some(io_err) => FsError::from_io(path, io_err),
            None => FsError::Io {
                path,
                source: io::Error::other("遍历目录时检测到循环链接"),
            },
        }
    }
}

impl Default for LocalFileSystem {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for LocalFileSystem {
    async fn file_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false)
    }

    async fn dir_exists(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn read(&self, path: &Path) -> FsResult<Vec<u8>> {
        fs::read(path).await.map_err(|e| FsError::from_io(path, e))
    }

    async fn read_range(&self, path: &Path, offset: u64, length: u64) -> FsResult<Vec<u8>> {
        let io_err = |e| FsError::from_io(path, e);
        let mut file = fs::File::open(path).await.map_err(io_err)?;
        file.seek(std::io::SeekFrom::Start(offset))
            .await
            .map_err(io_err)?;

        let mut buffer = Vec::with_capacity(length as usize);
        file.take(length)
            .read_to_end(&mut buffer)
            .await
            .map_err(io_err)?;
        Ok(buffer)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> FsResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| FsError::from_io(parent, e))?;
        }

        // 使用临时文件写入，然后原子重命名
        let mut temp_name = path.as_os_str().to_owned();
        temp_name.push(".tmp");
        let temp_path = PathBuf::from(temp_name);
        fs::write(&temp_path, data)
            .await
            .map_err(|e| FsError::from_io(&temp_path, e))?;
        fs::rename(&temp_path, path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn copy_file(&self, from: &Path, to: &Path, overwrite: bool) -> FsResult<()> {
        let src = from.to_path_buf();
        let dst = to.to_path_buf();
        Self::blocking(from, move || {
            let metadata = std::fs::metadata(&src).map_err(|e| FsError::from_io(&src, e))?;
            if !metadata.is_file() {
                return Err(FsError::NotFound(src));
            }
            if !overwrite && dst.exists() {
                return Err(FsError::AlreadyExists(dst));
            }

            std::fs::copy(&src, &dst).map_err(|e| FsError::from_io(&dst, e))?;
            Self::preserve_times(&metadata, &dst).map_err(|e| FsError::from_io(&dst, e))
        })
        .await
    }

    async fn move_file(&self, from: &Path, to: &Path) -> FsResult<()> {
        if !self.file_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }
        if fs::symlink_metadata(to).await.is_ok() {
            return Err(FsError::AlreadyExists(to.to_path_buf()));
        }
        fs::rename(from, to)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }

    async fn delete_file(&self, path: &Path) -> FsResult<()> {
        fs::remove_file(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn create_dir(&self, path: &Path) -> FsResult<()> {
        fs::create_dir_all(path)
            .await
            .map_err(|e| FsError::from_io(path, e))
    }

    async fn delete_dir(&self, path: &Path, recursive: bool) -> FsResult<()> {
        let result = if recursive {
            fs::remove_dir_all(path).await
        } else {
            fs::remove_dir(path).await
        };
        result.map_err(|e| FsError::from_io(path, e))
    }

    async fn move_dir(&self, from: &Path, to: &Path) -> FsResult<()> {
        if !self.dir_exists(from).await {
            return Err(FsError::NotFound(from.to_path_buf()));
        }
        if fs::symlink_metadata(to).await.is_ok() {
            return Err(FsError::AlreadyExists(to.to_path_buf()));
        }
        fs::rename(from, to)
            .await
            .map_err(|e| FsError::from_io(from, e))
    }

    async fn list_files(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| FsError::from_io(dir, e))?;
        let mut files = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(dir, e))?
        {
            if entry.file_type().await.map(|t| t.is_file()).unwrap_or(false) {
                files.push(entry.path());
            }
        }
        Ok(files)
    }

    async fn list_dirs(&self, dir: &Path) -> FsResult<Vec<PathBuf>> {
        let mut entries = fs::read_dir(dir)
            .await
            .map_err(|e| FsError::from_io(dir, e))?;
        let mut dirs = Vec::new();
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| FsError::from_io(dir, e))?
        {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                dirs.push(entry.path());
            }
        }
        Ok(dirs)
    }

    async fn stat_file(&self, path: &Path) -> FsResult<FileStat> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        if !metadata.is_file() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        Self::file_stat(&metadata, path)
    }

    async fn stat_dir(&self, path: &Path) -> FsResult<DirStat> {
        let metadata = fs::metadata(path)
            .await
            .map_err(|e| FsError::from_io(path, e))?;
        if !metadata.is_dir() {
            return Err(FsError::NotFound(path.to_path_buf()));
        }
        Ok(DirStat {
            creation_time_utc: metadata.created().ok().map(Self::to_utc),
        })
    }

    async fn list_all_files(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        if !self.dir_exists(root).await {
            return Err(FsError::NotFound(root.to_path_buf()));
        }
        let base = root.to_path_buf();
        // 使用 spawn_blocking 避免阻塞 async runtime
        Self::blocking(root, move || Self::walk(&base, false)).await
    }

    async fn list_all_folders(&self, root: &Path) -> FsResult<Vec<PathBuf>> {
        if !self.dir_exists(root).await {
            return Err(FsError::NotFound(root.to_path_buf()));
        }
        let base = root.to_path_buf();
        Self::blocking(root, move || Self::walk(&base, true)).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
