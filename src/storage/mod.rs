pub mod memory;
pub mod persistence;
pub mod table;

pub use memory::{CommittedTable, InMemoryStorage};
pub use persistence::{SNAPSHOT_FORMAT_VERSION, SnapshotDocument, SnapshotManager};
pub use table::Table;
