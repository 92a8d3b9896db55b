pub mod cli;
pub mod config;
pub mod core;
pub mod logging;
pub mod storage;

pub use config::MirrorConfig;
pub use crate::core::{MirrorPass, Scheduler, SyncEngine, SyncError, SyncStats};
pub use storage::{FileSystem, FsError, LocalFileSystem};

/// 各平台的用户配置目录
pub mod dirs {
    use std::path::PathBuf;

    pub fn config_dir() -> Option<PathBuf> {
        if cfg!(target_os = "windows") {
            std::env::var("APPDATA").ok().map(PathBuf::from)
        } else if cfg!(target_os = "macos") {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join("Library").join("Application Support"))
        } else {
            std::env::var("HOME")
                .ok()
                .map(|h| PathBuf::from(h).join(".config"))
        }
    }
}
