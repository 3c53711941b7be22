pub mod config;
pub mod database;

pub use config::{CorruptSnapshotPolicy, DEFAULT_SNAPSHOT_PATH, DEFAULT_TABLE_NAME, StoreConfig};
pub use database::{SnapshotStatus, SongDatabase};
