use crate::config::CompareConfig;
use crate::storage::{FileSystem, FsResult};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// 文件比较器：先比较元数据，必要时再比较内容
pub struct FileComparator {
    fs: Arc<dyn FileSystem>,
    config: CompareConfig,
}

impl FileComparator {
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::with_config(fs, CompareConfig::default())
    }

    pub fn with_config(fs: Arc<dyn FileSystem>, config: CompareConfig) -> Self {
        Self { fs, config }
    }

    /// 两个文件内容是否相同
    ///
    /// 比较过程中的任何错误都按"不相同"处理，调用方会因此选择重新复制。
    pub async fn are_identical(&self, a: &Path, b: &Path) -> bool {
        match self.try_identical(a, b).await {
            Ok(identical) => identical,
            Err(e) => {
                warn!("比较文件失败，按不相同处理: {} <-> {}: {}", a.display(), b.display(), e);
                false
            }
        }
    }

    /// 同 `are_identical`，但把比较错误交给调用方
    pub async fn try_identical(&self, a: &Path, b: &Path) -> FsResult<bool> {
        if a == b {
            return Ok(true);
        }

        if !self.fs.file_exists(a).await || !self.fs.file_exists(b).await {
            return Ok(false);
        }

        let stat_a = self.fs.stat_file(a).await?;
        let stat_b = self.fs.stat_file(b).await?;

        // 大小不同，肯定不同
        if stat_a.size != stat_b.size {
            return Ok(false);
        }

        // 复制时会保留修改时间，时间相同即认为内容相同
        if stat_a.last_write_time_utc == stat_b.last_write_time_utc {
            return Ok(true);
        }

        debug!(
            "文件时间不同，比较内容: {} (src_time={}, dst_time={})",
            a.display(),
            stat_a.last_write_time_utc,
            stat_b.last_write_time_utc
        );

        if stat_a.size < self.config.hash_threshold {
            Ok(self.hash_file(a).await? == self.hash_file(b).await?)
        } else {
            self.bytes_equal(a, b, stat_a.size).await
        }
    }

    /// 计算文件内容的 hash（BLAKE3，十六进制）
    pub async fn hash_file(&self, path: &Path) -> FsResult<String> {
        let chunk = self.chunk_size();
        let mut hasher = blake3::Hasher::new();
        let mut offset = 0u64;
        loop {
            let data = self.fs.read_range(path, offset, chunk).await?;
            if data.is_empty() {
                break;
            }
            hasher.update(&data);
            offset += data.len() as u64;
        }
        Ok(hasher.finalize().to_hex().to_string())
    }

    /// 逐块比较，遇到第一个不同的块就返回
    async fn bytes_equal(&self, a: &Path, b: &Path, size: u64) -> FsResult<bool> {
        let chunk = self.chunk_size();
        let mut offset = 0u64;
        while offset < size {
            let left = self.fs.read_range(a, offset, chunk).await?;
            let right = self.fs.read_range(b, offset, chunk).await?;
            if left != right {
                return Ok(false);
            }
            if left.is_empty() {
                break;
            }
            offset += left.len() as u64;
        }
        Ok(true)
    }

    fn chunk_size(&self) -> u64 {
        self.config.chunk_size.max(1)
    }
}
