// ============================================================================
// soundstore Library
// ============================================================================
//
// An in-memory song catalog with snapshot-isolated transactions and
// full-table JSON snapshots.
//
// ============================================================================

pub mod core;
pub mod facade;
pub mod storage;
pub mod transaction;

// Re-export main types for convenience
pub use core::{DbError, Result, Song, new_song_id};
pub use facade::{CorruptSnapshotPolicy, SnapshotStatus, SongDatabase, StoreConfig};
pub use storage::{SnapshotManager, Table};
pub use transaction::{
    ChangeEntry, ChangeKind, ChangeSet, Transaction, TransactionId, TransactionManager,
    TransactionMode, TransactionOptions, TransactionState,
};
