pub mod chain;
pub mod lock;
pub mod manager;
pub mod persistence;
pub mod types;

pub use chain::{ChainError, ChainKeySource, DirectoryKeySource, IntegrityFault, SnapshotChain};
pub use lock::{BuildLock, LockError};
pub use manager::{RebuildReport, SnapshotManager};
pub use persistence::SnapshotDatabase;
pub use types::{
    FrozenDescription, LiveContent, Links, NavTarget, PageRef, SnapshotKey, SnapshotPage,
};
