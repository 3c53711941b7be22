use std::path::PathBuf;

pub const DEFAULT_SNAPSHOT_PATH: &str = "database/state.json";
pub const DEFAULT_TABLE_NAME: &str = "song";

/// What `SongDatabase::open` does when the snapshot exists but is unusable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CorruptSnapshotPolicy {
    /// Return the error and refuse to start.
    #[default]
    Fail,
    /// Log the problem and carry on: an unparsable document leaves the table
    /// empty, invalid entries are skipped.
    StartEmpty,
}

/// Store configuration
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Snapshot file written by `commit_database` and read at startup
    pub snapshot_path: PathBuf,

    /// Name reported in change entries
    pub table_name: String,

    /// Reject `create_song` for an identifier that already exists instead
    /// of replacing it
    pub strict_inserts: bool,

    /// Pretty-print the snapshot document
    pub pretty: bool,

    pub corrupt_snapshot_policy: CorruptSnapshotPolicy,
}

impl StoreConfig {
    pub fn new() -> Self {
        Self {
            snapshot_path: PathBuf::from(DEFAULT_SNAPSHOT_PATH),
            table_name: DEFAULT_TABLE_NAME.to_string(),
            strict_inserts: false,
            pretty: true,
            corrupt_snapshot_policy: CorruptSnapshotPolicy::Fail,
        }
    }

    pub fn snapshot_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.snapshot_path = path.into();
        self
    }

    pub fn table_name(mut self, name: &str) -> Self {
        self.table_name = name.to_string();
        self
    }

    pub fn strict_inserts(mut self, strict: bool) -> Self {
        self.strict_inserts = strict;
        self
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn corrupt_snapshot_policy(mut self, policy: CorruptSnapshotPolicy) -> Self {
        self.corrupt_snapshot_policy = policy;
        self
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::new()
    }
}
