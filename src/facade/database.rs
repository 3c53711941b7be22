use super::config::{CorruptSnapshotPolicy, StoreConfig};
use crate::core::{DbError, Result, Song};
use crate::storage::SnapshotManager;
use crate::transaction::{ChangeSet, Transaction, TransactionManager, TransactionOptions};
use tracing::{error, info, warn};

/// Outcome of a snapshot save, for callers that report rather than propagate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SnapshotStatus {
    Saved { songs: usize },
    Failed { error: String },
}

impl SnapshotStatus {
    pub fn is_ok(&self) -> bool {
        matches!(self, SnapshotStatus::Saved { .. })
    }
}

/// The song catalog: a transactional table plus its snapshot file.
///
/// Built once at startup and handed to whatever serves requests; there is
/// no process-wide instance.
///
/// # Examples
///
/// ```no_run
/// use soundstore::{Song, SongDatabase, StoreConfig};
///
/// # tokio_test::block_on(async {
/// let db = SongDatabase::open(StoreConfig::new()).await.unwrap();
/// let song = db.create_song(Song::new("Birds", "cartoon birds")).await.unwrap();
/// assert_eq!(db.get_song(&song.id).unwrap().title, "Birds");
/// db.commit_database().unwrap();
/// # });
/// ```
pub struct SongDatabase {
    config: StoreConfig,
    transactions: TransactionManager,
    snapshots: SnapshotManager,
}

impl SongDatabase {
    /// An empty database; nothing is read from disk.
    pub fn new(config: StoreConfig) -> Self {
        let transactions = TransactionManager::new(&config.table_name);
        let snapshots = SnapshotManager::new(&config.snapshot_path).pretty(config.pretty);
        Self {
            config,
            transactions,
            snapshots,
        }
    }

    /// Create the database and seed it from the snapshot file.
    ///
    /// A missing or unreadable file starts an empty table. A corrupt one is
    /// handled according to `corrupt_snapshot_policy`.
    pub async fn open(config: StoreConfig) -> Result<Self> {
        let db = Self::new(config);
        let loaded = db.restore().await?;
        info!(
            path = %db.snapshots.path().display(),
            songs = loaded,
            "song database ready"
        );
        Ok(db)
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn transactions(&self) -> &TransactionManager {
        &self.transactions
    }

    pub fn snapshots(&self) -> &SnapshotManager {
        &self.snapshots
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Run `f` in one write transaction, committing if it succeeds.
    pub async fn write<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        self.run_write(false, f).await.map(|(value, _)| value)
    }

    /// Like `write`, also returning what the transaction changed.
    pub async fn write_tracked<T, F>(&self, f: F) -> Result<(T, ChangeSet)>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let (value, changes) = self.run_write(true, f).await?;
        Ok((value, changes.unwrap_or_default()))
    }

    async fn run_write<T, F>(&self, track: bool, f: F) -> Result<(T, Option<ChangeSet>)>
    where
        F: FnOnce(&mut Transaction) -> Result<T>,
    {
        let options = TransactionOptions::read_write().track_changes(track);
        let mut txn = self.transactions.begin_with(options).await?;

        let value = match f(&mut txn) {
            Ok(value) => value,
            Err(err) => {
                txn.abort();
                return Err(err);
            }
        };

        self.transactions.commit(&mut txn)?;
        let changes = if track {
            Some(txn.changes()?.clone())
        } else {
            None
        };
        Ok((value, changes))
    }

    /// Run `f` against a read-only view of the committed table.
    pub fn read<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Transaction) -> Result<T>,
    {
        let mut txn = self.transactions.begin_read()?;
        let value = f(&txn);
        txn.abort();
        value
    }

    // ------------------------------------------------------------------
    // Songs
    // ------------------------------------------------------------------

    pub async fn create_song(&self, song: Song) -> Result<Song> {
        let strict = self.config.strict_inserts;
        let stored = song.clone();
        self.write(move |txn| {
            if strict {
                txn.insert_new(song)
            } else {
                txn.insert(song).map(|_| ())
            }
        })
        .await?;

        info!(id = %stored.id, title = %stored.title, path = %stored.path, "added song to database");
        Ok(stored)
    }

    /// Replace an existing song; returns the previous version.
    pub async fn update_song(&self, song: Song) -> Result<Song> {
        self.write(move |txn| {
            txn.get(&song.id)?;
            txn.insert(song)?
                .ok_or_else(|| DbError::TransactionState("song vanished during update".into()))
        })
        .await
    }

    /// Record where the song's content was stored.
    pub async fn attach_path(&self, id: &str, path: &str) -> Result<Song> {
        self.write(|txn| {
            let song = txn.get(id)?.clone().path(path);
            txn.insert(song.clone())?;
            Ok(song)
        })
        .await
    }

    pub async fn delete_song(&self, id: &str) -> Result<Song> {
        let removed = self.write(|txn| txn.delete(id)).await?;
        info!(id = %removed.id, title = %removed.title, "removed song from database");
        Ok(removed)
    }

    pub fn get_song(&self, id: &str) -> Result<Song> {
        self.read(|txn| txn.get(id).cloned())
    }

    /// All songs in identifier order.
    pub fn list_songs(&self) -> Result<Vec<Song>> {
        self.read(|txn| Ok(txn.iter()?.collect()))
    }

    pub fn song_count(&self) -> Result<usize> {
        self.transactions.row_count()
    }

    // ------------------------------------------------------------------
    // Snapshots
    // ------------------------------------------------------------------

    /// Write the committed table to the snapshot file.
    pub fn commit_database(&self) -> Result<usize> {
        self.read(|txn| self.snapshots.save(txn.table()?))
    }

    /// `commit_database`, with failures turned into a status value.
    pub fn save_status(&self) -> SnapshotStatus {
        match self.commit_database() {
            Ok(songs) => SnapshotStatus::Saved { songs },
            Err(err) => {
                error!(error = %err, "error saving database");
                SnapshotStatus::Failed {
                    error: err.to_string(),
                }
            }
        }
    }

    /// Songs currently in the snapshot file, without touching the table.
    /// A missing file reads as empty.
    pub fn load_database(&self) -> Result<Vec<Song>> {
        match self.snapshots.load() {
            Err(DbError::SnapshotNotFound(_)) => Ok(Vec::new()),
            other => other,
        }
    }

    /// Replace the table contents with the snapshot file in one transaction.
    pub async fn reload(&self) -> Result<usize> {
        let songs = self.load_database()?;
        self.replay(songs, true).await
    }

    async fn restore(&self) -> Result<usize> {
        let songs = match self.snapshots.load() {
            Ok(songs) => songs,
            Err(DbError::SnapshotNotFound(path)) => {
                info!(path = %path.display(), "no snapshot found, starting with an empty table");
                return Ok(0);
            }
            Err(err @ DbError::Deserialization(_)) => {
                return match self.config.corrupt_snapshot_policy {
                    CorruptSnapshotPolicy::Fail => {
                        error!(error = %err, "snapshot is corrupt, refusing to start");
                        Err(err)
                    }
                    CorruptSnapshotPolicy::StartEmpty => {
                        warn!(error = %err, "snapshot is corrupt, starting with an empty table");
                        Ok(0)
                    }
                };
            }
            Err(err) => {
                warn!(error = %err, "could not read snapshot, starting with an empty table");
                return Ok(0);
            }
        };
        self.replay(songs, false).await
    }

    async fn replay(&self, songs: Vec<Song>, replace: bool) -> Result<usize> {
        let strict = self.config.strict_inserts;
        let lenient = self.config.corrupt_snapshot_policy == CorruptSnapshotPolicy::StartEmpty;

        self.write(move |txn| {
            if replace {
                let existing: Vec<String> = txn.iter()?.map(|song| song.id).collect();
                for id in existing {
                    txn.delete(&id)?;
                }
            }

            for song in songs {
                let id = song.id.clone();
                let inserted = if strict {
                    txn.insert_new(song)
                } else {
                    txn.insert(song).map(|_| ())
                };
                match inserted {
                    Ok(()) => {}
                    Err(err) if lenient => {
                        warn!(id = %id, error = %err, "skipping invalid snapshot entry");
                    }
                    Err(err) => {
                        return Err(DbError::Deserialization(format!(
                            "Invalid snapshot entry '{}': {}",
                            id, err
                        )));
                    }
                }
            }
            txn.len()
        })
        .await
    }
}

impl std::fmt::Debug for SongDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SongDatabase")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
