// ============================================================================
// Transaction Change Tracking
// ============================================================================
//
// A tracked write transaction remembers the committed value of every song it
// touches. At commit the final value is read back from the working copy and
// paired with it, giving one entry per identifier.
//
// ============================================================================

use crate::core::Song;
use crate::storage::Table;
use std::collections::HashMap;
use std::sync::Arc;

/// What a committed change did to a song.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// No song existed under the identifier before the transaction.
    Created,
    /// A different song replaced the one that existed.
    Updated,
    /// The song was removed.
    Deleted,
}

impl std::fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChangeKind::Created => write!(f, "created"),
            ChangeKind::Updated => write!(f, "updated"),
            ChangeKind::Deleted => write!(f, "deleted"),
        }
    }
}

/// Net effect of one transaction on one identifier.
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEntry {
    table: Arc<str>,
    id: String,
    before: Option<Song>,
    after: Option<Song>,
}

impl ChangeEntry {
    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn before(&self) -> Option<&Song> {
        self.before.as_ref()
    }

    pub fn after(&self) -> Option<&Song> {
        self.after.as_ref()
    }

    pub fn kind(&self) -> ChangeKind {
        match (&self.before, &self.after) {
            (None, _) => ChangeKind::Created,
            (Some(_), Some(_)) => ChangeKind::Updated,
            (Some(_), None) => ChangeKind::Deleted,
        }
    }

    pub fn is_created(&self) -> bool {
        self.kind() == ChangeKind::Created
    }

    pub fn is_updated(&self) -> bool {
        self.kind() == ChangeKind::Updated
    }

    pub fn is_deleted(&self) -> bool {
        self.kind() == ChangeKind::Deleted
    }
}

/// Changes of one committed write transaction, in order of first mutation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    version: u64,
    entries: Vec<ChangeEntry>,
}

impl ChangeSet {
    /// Commit sequence number that produced these changes.
    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn entries(&self) -> &[ChangeEntry] {
        &self.entries
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ChangeEntry> {
        self.entries.iter()
    }

    pub fn get(&self, id: &str) -> Option<&ChangeEntry> {
        self.entries.iter().find(|entry| entry.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeEntry;
    type IntoIter = std::slice::Iter<'a, ChangeEntry>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// Collects the pre-transaction value of every touched identifier.
#[derive(Debug)]
pub(crate) struct ChangeTracker {
    table: Arc<str>,
    order: Vec<String>,
    before: HashMap<String, Option<Song>>,
}

impl ChangeTracker {
    pub(crate) fn new(table: &str) -> Self {
        Self {
            table: Arc::from(table),
            order: Vec::new(),
            before: HashMap::new(),
        }
    }

    /// Only the first call per identifier is kept; later ones see staged values.
    pub(crate) fn record(&mut self, id: &str, before: Option<Song>) {
        if self.before.contains_key(id) {
            return;
        }
        self.order.push(id.to_string());
        self.before.insert(id.to_string(), before);
    }

    pub(crate) fn touched(&self) -> usize {
        self.order.len()
    }

    /// Pair each recorded value with its final value in `working`.
    /// Identifiers that ended where they started are dropped.
    pub(crate) fn finish(mut self, working: &Table, version: u64) -> ChangeSet {
        let mut entries = Vec::with_capacity(self.order.len());
        for id in self.order {
            let before = self.before.remove(&id).flatten();
            let after = working.get(&id).cloned();
            if before == after {
                continue;
            }
            entries.push(ChangeEntry {
                table: Arc::clone(&self.table),
                id,
                before,
                after,
            });
        }
        ChangeSet { version, entries }
    }
}
