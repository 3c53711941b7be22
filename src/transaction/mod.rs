// ============================================================================
// Transaction Management Module
// ============================================================================
//
// Snapshot isolation over a copy-on-write table:
// - readers pin a committed version and never block
// - a single writer stages changes on a private copy
// - commit swaps the committed version in one step
//
// ============================================================================

pub mod change;
pub mod manager;
pub mod state;

pub use change::{ChangeEntry, ChangeKind, ChangeSet};
pub use manager::TransactionManager;
pub use state::{
    Transaction, TransactionId, TransactionMode, TransactionOptions, TransactionState,
};
