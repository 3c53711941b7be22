// ============================================================================
// Transaction State Management
// ============================================================================
//
// Each transaction moves through defined states: Active -> Committed/Aborted.
//
// A transaction owns its view of the table:
// - read-only: the committed version current at begin, shared with others
// - read-write: a private working copy, cloned lazily on first write
//
// Neither view changes because of another transaction's commit.
//
// ============================================================================

use super::change::{ChangeSet, ChangeTracker};
use crate::core::{DbError, Result, Song};
use crate::storage::{CommittedTable, Table};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Get the raw ID value
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

/// Transaction state
///
/// State transitions:
/// ```text
/// Active ──commit──> Committed
///   │
///   └──abort──> Aborted
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    /// Transaction is active and can execute operations
    Active,

    /// Transaction has been successfully committed
    Committed,

    /// Transaction has been aborted
    Aborted,
}

impl TransactionState {
    /// Check if transaction can execute operations
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }

    /// Check if transaction is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransactionState::Committed | TransactionState::Aborted)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionMode {
    ReadOnly,
    ReadWrite,
}

/// How to open a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransactionOptions {
    pub writable: bool,
    pub track_changes: bool,
}

impl TransactionOptions {
    pub fn read_only() -> Self {
        Self::default()
    }

    pub fn read_write() -> Self {
        Self {
            writable: true,
            track_changes: false,
        }
    }

    /// Record a change set, readable after commit. Ignored for readers.
    pub fn track_changes(mut self, track: bool) -> Self {
        self.track_changes = track;
        self
    }
}

/// A transaction over the song table.
///
/// Dropping an active read-write transaction aborts it and frees the writer
/// slot.
#[derive(Debug)]
pub struct Transaction {
    id: TransactionId,
    mode: TransactionMode,
    state: TransactionState,

    /// Commit version the view was taken from
    base_version: u64,

    /// Set once a read-write transaction commits
    commit_version: Option<u64>,

    view: Arc<Table>,
    tracker: Option<ChangeTracker>,
    changes: Option<ChangeSet>,

    /// Held for the whole life of a read-write transaction
    writer: Option<OwnedMutexGuard<()>>,

    start_time: std::time::Instant,
}

impl Transaction {
    pub(crate) fn read_only(id: TransactionId, committed: CommittedTable) -> Self {
        Self::new(id, TransactionMode::ReadOnly, committed, None, None)
    }

    pub(crate) fn read_write(
        id: TransactionId,
        committed: CommittedTable,
        writer: OwnedMutexGuard<()>,
        track_changes: bool,
    ) -> Self {
        let tracker = track_changes.then(|| ChangeTracker::new(committed.table.name()));
        Self::new(id, TransactionMode::ReadWrite, committed, Some(writer), tracker)
    }

    fn new(
        id: TransactionId,
        mode: TransactionMode,
        committed: CommittedTable,
        writer: Option<OwnedMutexGuard<()>>,
        tracker: Option<ChangeTracker>,
    ) -> Self {
        Self {
            id,
            mode,
            state: TransactionState::Active,
            base_version: committed.version,
            commit_version: None,
            view: committed.table,
            tracker,
            changes: None,
            writer,
            start_time: std::time::Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    pub fn mode(&self) -> TransactionMode {
        self.mode
    }

    pub fn is_writable(&self) -> bool {
        self.mode == TransactionMode::ReadWrite
    }

    pub fn is_tracking_changes(&self) -> bool {
        self.tracker.is_some() || self.changes.is_some()
    }

    pub fn base_version(&self) -> u64 {
        self.base_version
    }

    pub fn commit_version(&self) -> Option<u64> {
        self.commit_version
    }

    pub fn duration(&self) -> std::time::Duration {
        self.start_time.elapsed()
    }

    // ------------------------------------------------------------------
    // Table operations
    // ------------------------------------------------------------------

    /// The song with `id` as this transaction sees it.
    pub fn get(&self, id: &str) -> Result<&Song> {
        self.ensure_active()?;
        self.view
            .get(id)
            .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    pub fn contains(&self, id: &str) -> Result<bool> {
        self.ensure_active()?;
        Ok(self.view.contains(id))
    }

    /// Songs in identifier order. The sequence is detached from the
    /// transaction and unaffected by later writes.
    pub fn iter(&self) -> Result<impl Iterator<Item = Song> + Send + use<>> {
        self.ensure_active()?;
        Ok(self.view.iter())
    }

    pub fn len(&self) -> Result<usize> {
        self.ensure_active()?;
        Ok(self.view.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// The whole table view, for bulk readers such as snapshot writers.
    pub fn table(&self) -> Result<&Table> {
        self.ensure_active()?;
        Ok(&self.view)
    }

    /// Insert or replace; returns the replaced song.
    pub fn insert(&mut self, song: Song) -> Result<Option<Song>> {
        self.ensure_writable()?;
        let id = song.id.clone();
        let previous = Arc::make_mut(&mut self.view).insert(song)?;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record(&id, previous.clone());
        }
        Ok(previous)
    }

    /// Insert, failing with `DuplicateKey` if the identifier is taken.
    pub fn insert_new(&mut self, song: Song) -> Result<()> {
        self.ensure_writable()?;
        let id = song.id.clone();
        Arc::make_mut(&mut self.view).insert_new(song)?;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record(&id, None);
        }
        Ok(())
    }

    pub fn delete(&mut self, id: &str) -> Result<Song> {
        self.ensure_writable()?;
        let removed = Arc::make_mut(&mut self.view).delete(id)?;
        if let Some(tracker) = self.tracker.as_mut() {
            tracker.record(id, Some(removed.clone()));
        }
        Ok(removed)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Discard staged changes. Safe to call repeatedly and after commit.
    pub fn abort(&mut self) {
        if !self.state.is_active() {
            return;
        }
        self.state = TransactionState::Aborted;
        self.tracker = None;
        self.writer = None;
        debug!(txn = %self.id, mode = ?self.mode, "transaction aborted");
    }

    /// Changes made by this transaction.
    ///
    /// Only available after a successful commit of a transaction that was
    /// opened with change tracking.
    pub fn changes(&self) -> Result<&ChangeSet> {
        match self.state {
            TransactionState::Committed => self.changes.as_ref().ok_or_else(|| {
                DbError::TransactionState(format!(
                    "Transaction {} was not tracking changes",
                    self.id
                ))
            }),
            state => Err(DbError::TransactionState(format!(
                "Changes of transaction {} are not available while it is {}",
                self.id, state
            ))),
        }
    }

    pub(crate) fn ensure_active(&self) -> Result<()> {
        if !self.state.is_active() {
            return Err(DbError::TransactionState(format!(
                "Transaction {} is already {}",
                self.id, self.state
            )));
        }
        Ok(())
    }

    fn ensure_writable(&self) -> Result<()> {
        self.ensure_active()?;
        if !self.is_writable() {
            return Err(DbError::ReadOnlyTransaction(self.id.to_string()));
        }
        Ok(())
    }

    pub(crate) fn working_table(&self) -> Arc<Table> {
        Arc::clone(&self.view)
    }

    pub(crate) fn pending_change_count(&self) -> usize {
        self.tracker.as_ref().map_or(0, ChangeTracker::touched)
    }

    /// Move to `Committed`, finish change tracking and free the writer slot.
    pub(crate) fn mark_committed(&mut self, version: Option<u64>) {
        if let (Some(tracker), Some(version)) = (self.tracker.take(), version) {
            self.changes = Some(tracker.finish(&self.view, version));
        }
        self.commit_version = version;
        self.state = TransactionState::Committed;
        self.writer = None;
    }

    pub(crate) fn committed_changes(&self) -> Option<&ChangeSet> {
        self.changes.as_ref()
    }
}

impl Drop for Transaction {
    fn drop(&mut self) {
        if self.state.is_active() && self.is_writable() {
            debug!(txn = %self.id, "write transaction dropped without commit");
            self.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;
    use tokio::sync::Mutex;

    fn committed(songs: &[(&str, &str)]) -> CommittedTable {
        let mut table = Table::new("song");
        for (id, title) in songs {
            table.insert(Song::with_id(*id, *title, "")).unwrap();
        }
        CommittedTable {
            table: StdArc::new(table),
            version: 3,
        }
    }

    fn writer(track: bool, base: CommittedTable) -> Transaction {
        let guard = StdArc::new(Mutex::new(())).try_lock_owned().unwrap();
        Transaction::read_write(TransactionId(1), base, guard, track)
    }

    #[test]
    fn test_transaction_id_display() {
        assert_eq!(TransactionId(42).to_string(), "txn_42");
    }

    #[test]
    fn test_writes_do_not_touch_base() {
        let base = committed(&[("a", "x")]);
        let shared = StdArc::clone(&base.table);
        let mut txn = writer(false, base);

        txn.insert(Song::with_id("b", "y", "")).unwrap();
        txn.delete("a").unwrap();

        assert_eq!(txn.len().unwrap(), 1);
        assert!(shared.contains("a"));
        assert!(!shared.contains("b"));
    }

    #[test]
    fn test_read_only_rejects_writes() {
        let mut txn = Transaction::read_only(TransactionId(2), committed(&[]));
        let err = txn.insert(Song::with_id("a", "x", "")).unwrap_err();
        assert!(matches!(err, DbError::ReadOnlyTransaction(_)));
        assert!(matches!(txn.delete("a"), Err(DbError::ReadOnlyTransaction(_))));
    }

    #[test]
    fn test_finished_transaction_cannot_be_used() {
        let mut txn = writer(false, committed(&[("a", "x")]));
        txn.abort();
        txn.abort();
        assert_eq!(txn.state(), TransactionState::Aborted);
        assert!(matches!(txn.get("a"), Err(DbError::TransactionState(_))));
        assert!(matches!(
            txn.insert(Song::with_id("b", "y", "")),
            Err(DbError::TransactionState(_))
        ));
        assert!(txn.iter().is_err());
    }

    #[test]
    fn test_changes_only_after_commit() {
        let mut txn = writer(true, committed(&[("a", "x")]));
        txn.insert(Song::with_id("a", "y", "")).unwrap();
        assert_eq!(txn.pending_change_count(), 1);
        assert!(matches!(txn.changes(), Err(DbError::TransactionState(_))));

        txn.mark_committed(Some(4));
        let changes = txn.changes().unwrap();
        assert_eq!(changes.len(), 1);
        assert!(changes.entries()[0].is_updated());
        assert_eq!(txn.commit_version(), Some(4));

        txn.abort();
        assert_eq!(txn.state(), TransactionState::Committed);
    }

    #[test]
    fn test_untracked_commit_has_no_changes() {
        let mut txn = writer(false, committed(&[]));
        txn.insert(Song::with_id("a", "x", "")).unwrap();
        txn.mark_committed(Some(4));
        assert!(matches!(txn.changes(), Err(DbError::TransactionState(_))));
    }

    #[test]
    fn test_get_missing_is_not_found() {
        let txn = Transaction::read_only(TransactionId(3), committed(&[("a", "x")]));
        assert_eq!(txn.get("a").unwrap().title, "x");
        assert!(txn.get("zz").unwrap_err().is_not_found());
    }
}
