use super::Table;
use crate::core::Result;
use std::sync::{Arc, RwLock};

/// A committed table version together with its commit sequence number.
#[derive(Debug, Clone)]
pub struct CommittedTable {
    pub table: Arc<Table>,
    pub version: u64,
}

/// Holds the committed state of one table.
///
/// The state is never mutated in place: a commit publishes a whole new
/// version and readers keep whichever `Arc` they already cloned. The lock
/// only guards the pointer swap, never a table operation.
pub struct InMemoryStorage {
    committed: RwLock<CommittedTable>,
}

impl InMemoryStorage {
    pub fn new(table_name: &str) -> Self {
        Self {
            committed: RwLock::new(CommittedTable {
                table: Arc::new(Table::new(table_name)),
                version: 0,
            }),
        }
    }

    /// Current committed version.
    pub fn current(&self) -> Result<CommittedTable> {
        Ok(self.committed.read()?.clone())
    }

    /// Replace the committed table and return the new version number.
    ///
    /// Callers must hold the writer slot; that is what keeps commits totally
    /// ordered.
    pub fn publish(&self, table: Arc<Table>) -> Result<u64> {
        let mut committed = self.committed.write()?;
        committed.version += 1;
        committed.table = table;
        Ok(committed.version)
    }

    pub fn version(&self) -> Result<u64> {
        Ok(self.committed.read()?.version)
    }

    pub fn row_count(&self) -> Result<usize> {
        Ok(self.committed.read()?.table.len())
    }
}
