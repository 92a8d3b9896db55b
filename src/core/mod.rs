pub mod comparator;
pub mod engine;
pub mod error;
pub mod file_sync;
pub mod folder_sync;
pub mod matcher;
pub mod operator;
pub mod scheduler;
pub mod stats;

pub use comparator::FileComparator;
pub use engine::{MirrorPass, SyncEngine};
pub use error::{Result, SyncError};
pub use file_sync::{CandidateIndex, FileSynchronizer};
pub use folder_sync::{FolderSynchronizer, ReconcileSession};
pub use matcher::{FolderProfile, MatchOutcome, MatchStrategy};
pub use operator::{with_retry, CopyOutcome, FileOperator, FolderOperator};
pub use scheduler::Scheduler;
pub use stats::SyncStats;
