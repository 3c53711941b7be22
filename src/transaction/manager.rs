// ============================================================================
// Transaction Manager
// ============================================================================

use super::{ChangeSet, Transaction, TransactionId, TransactionOptions};
use crate::core::{DbError, Result};
use crate::storage::{InMemoryStorage, Table};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::{Mutex, broadcast};
use tracing::debug;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Issues transactions against one table.
///
/// - Any number of readers, each pinned to the committed version current
///   when it began. Readers never wait on writers.
/// - At most one writer at a time. `begin_write` waits for the slot, which is
///   held until the writer commits, aborts or is dropped.
/// - Commit publishes the writer's working copy in a single pointer swap, so
///   commits are totally ordered and never partially visible.
pub struct TransactionManager {
    storage: InMemoryStorage,
    writer: Arc<Mutex<()>>,
    next_txn_id: AtomicU64,
    change_feed: broadcast::Sender<Arc<ChangeSet>>,
}

impl TransactionManager {
    pub fn new(table_name: &str) -> Self {
        let (change_feed, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            storage: InMemoryStorage::new(table_name),
            writer: Arc::new(Mutex::new(())),
            next_txn_id: AtomicU64::new(1),
            change_feed,
        }
    }

    fn next_id(&self) -> TransactionId {
        TransactionId(self.next_txn_id.fetch_add(1, Ordering::SeqCst))
    }

    /// Open a transaction; `writable` ones wait for the writer slot.
    pub async fn begin(&self, writable: bool) -> Result<Transaction> {
        let options = if writable {
            TransactionOptions::read_write()
        } else {
            TransactionOptions::read_only()
        };
        self.begin_with(options).await
    }

    pub async fn begin_with(&self, options: TransactionOptions) -> Result<Transaction> {
        if !options.writable {
            return self.begin_read();
        }
        let guard = Arc::clone(&self.writer).lock_owned().await;
        self.start_write(guard, options.track_changes)
    }

    /// Open a read-only transaction on the current committed version.
    pub fn begin_read(&self) -> Result<Transaction> {
        let committed = self.storage.current()?;
        let txn = Transaction::read_only(self.next_id(), committed);
        debug!(txn = %txn.id(), version = txn.base_version(), "read transaction started");
        Ok(txn)
    }

    pub async fn begin_write(&self) -> Result<Transaction> {
        self.begin(true).await
    }

    /// Like `begin_write`, but returns `None` instead of waiting when another
    /// writer holds the slot.
    pub fn try_begin_write(&self, track_changes: bool) -> Result<Option<Transaction>> {
        match Arc::clone(&self.writer).try_lock_owned() {
            Ok(guard) => self.start_write(guard, track_changes).map(Some),
            Err(_) => Ok(None),
        }
    }

    fn start_write(
        &self,
        guard: tokio::sync::OwnedMutexGuard<()>,
        track_changes: bool,
    ) -> Result<Transaction> {
        let committed = self.storage.current()?;
        let txn = Transaction::read_write(self.next_id(), committed, guard, track_changes);
        debug!(
            txn = %txn.id(),
            version = txn.base_version(),
            track_changes,
            "write transaction started"
        );
        Ok(txn)
    }

    /// Commit `txn` and return the committed version it produced (or, for a
    /// reader, the version it was reading).
    ///
    /// On error the committed state is unchanged and `txn` stays active, so
    /// the caller can still abort it.
    pub fn commit(&self, txn: &mut Transaction) -> Result<u64> {
        txn.ensure_active()?;

        if !txn.is_writable() {
            txn.mark_committed(None);
            return Ok(txn.base_version());
        }

        // The writer slot has been held since begin, so nothing can have
        // been published in between unless the handle came from elsewhere.
        let current = self.storage.version()?;
        if current != txn.base_version() {
            return Err(DbError::TransactionState(format!(
                "Transaction {} started at version {} but the table is at version {}",
                txn.id(),
                txn.base_version(),
                current
            )));
        }

        let version = self.storage.publish(txn.working_table())?;
        txn.mark_committed(Some(version));
        debug!(txn = %txn.id(), version, "write transaction committed");

        if let Some(changes) = txn.committed_changes()
            && !changes.is_empty()
            && self.change_feed.receiver_count() > 0
        {
            // Lagging or absent receivers are not the committer's problem.
            let _ = self.change_feed.send(Arc::new(changes.clone()));
        }

        Ok(version)
    }

    /// Discard `txn`. Idempotent, and a no-op after commit.
    pub fn abort(&self, txn: &mut Transaction) {
        txn.abort();
    }

    /// Receive the change set of every tracked commit from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<ChangeSet>> {
        self.change_feed.subscribe()
    }

    pub fn committed_version(&self) -> Result<u64> {
        self.storage.version()
    }

    /// The committed table as of now.
    pub fn committed_table(&self) -> Result<Arc<Table>> {
        Ok(self.storage.current()?.table)
    }

    pub fn row_count(&self) -> Result<usize> {
        self.storage.row_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::Song;
    use crate::transaction::{ChangeKind, TransactionState};

    fn song(id: &str, title: &str) -> Song {
        Song::with_id(id, title, "")
    }

    #[tokio::test]
    async fn test_commit_publishes_working_copy() {
        let manager = TransactionManager::new("song");
        let mut txn = manager.begin(true).await.unwrap();
        txn.insert(song("a", "x")).unwrap();
        assert_eq!(manager.row_count().unwrap(), 0);

        assert_eq!(manager.commit(&mut txn).unwrap(), 1);
        assert_eq!(txn.state(), TransactionState::Committed);
        assert_eq!(manager.row_count().unwrap(), 1);
        assert_eq!(manager.committed_version().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_commit_twice_fails() {
        let manager = TransactionManager::new("song");
        let mut txn = manager.begin_write().await.unwrap();
        manager.commit(&mut txn).unwrap();
        assert!(matches!(
            manager.commit(&mut txn),
            Err(DbError::TransactionState(_))
        ));
        assert_eq!(manager.committed_version().unwrap(), 1);
    }

    #[tokio::test]
    async fn test_single_writer_slot() {
        let manager = TransactionManager::new("song");
        let mut first = manager.begin_write().await.unwrap();
        assert!(manager.try_begin_write(false).unwrap().is_none());

        manager.abort(&mut first);
        let second = manager.try_begin_write(false).unwrap();
        assert!(second.is_some());
        drop(second);

        assert!(manager.try_begin_write(false).unwrap().is_some());
    }

    #[tokio::test]
    async fn test_reader_commit_is_noop() {
        let manager = TransactionManager::new("song");
        let mut reader = manager.begin(false).await.unwrap();
        assert_eq!(manager.commit(&mut reader).unwrap(), 0);
        assert_eq!(reader.state(), TransactionState::Committed);
        assert_eq!(manager.committed_version().unwrap(), 0);
    }

    #[tokio::test]
    async fn test_foreign_transaction_rejected() {
        let ours = TransactionManager::new("song");
        let theirs = TransactionManager::new("song");

        let mut bump = theirs.begin_write().await.unwrap();
        theirs.commit(&mut bump).unwrap();

        let mut txn = theirs.begin_write().await.unwrap();
        txn.insert(song("a", "x")).unwrap();
        assert!(ours.commit(&mut txn).is_err());
        assert_eq!(ours.row_count().unwrap(), 0);
        assert_eq!(txn.state(), TransactionState::Active);
    }

    #[tokio::test]
    async fn test_subscribers_receive_change_sets() {
        let manager = TransactionManager::new("song");
        let mut feed = manager.subscribe();

        let mut txn = manager
            .begin_with(TransactionOptions::read_write().track_changes(true))
            .await
            .unwrap();
        txn.insert(song("a", "x")).unwrap();
        manager.commit(&mut txn).unwrap();

        let changes = feed.recv().await.unwrap();
        assert_eq!(changes.version(), 1);
        assert_eq!(changes.entries()[0].kind(), ChangeKind::Created);
    }
}
