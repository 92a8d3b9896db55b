use serde::Serialize;
use std::fmt;

/// 单次同步的统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// 新增或更新的文件
    pub files_changed: u64,
    /// 新建的文件夹
    pub folders_changed: u64,
    /// 单独移动的文件
    pub files_moved: u64,
    /// 整体移动的文件夹
    pub folders_moved: u64,
    /// 随文件夹移动的文件
    pub files_in_moved_folders: u64,
    pub files_deleted: u64,
    pub folders_deleted: u64,
}

impl SyncStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// 本次同步是否没有任何改动
    pub fn is_unchanged(&self) -> bool {
        self.files_changed == 0
            && self.folders_changed == 0
            && self.files_moved == 0
            && self.folders_moved == 0
            && self.files_deleted == 0
            && self.folders_deleted == 0
    }
}

impl fmt::Display for SyncStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "文件变更 {}, 新建文件夹 {}, 移动文件 {}, 移动文件夹 {} (含 {} 个文件), 删除文件 {}, 删除文件夹 {}",
            self.files_changed,
            self.folders_changed,
            self.files_moved,
            self.folders_moved,
            self.files_in_moved_folders,
            self.files_deleted,
            self.folders_deleted
        )
    }
}
