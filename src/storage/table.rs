use crate::core::{DbError, Result, Song};
use im::OrdMap;
use std::sync::Arc;

/// Songs indexed by their unique identifier.
///
/// Backed by a persistent ordered map, so `clone` is O(1) and shares
/// structure with the original. Transactions rely on this: a working copy is
/// a clone of the committed table and readers keep their clone for as long
/// as they like.
#[derive(Debug, Clone)]
pub struct Table {
    name: Arc<str>,
    rows: OrdMap<String, Song>,
}

impl Table {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            rows: OrdMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn get(&self, id: &str) -> Option<&Song> {
        self.rows.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.rows.contains_key(id)
    }

    /// All songs in identifier order.
    ///
    /// The iterator owns its own version of the table, so later writes to
    /// `self` are never observed through it.
    pub fn iter(&self) -> impl Iterator<Item = Song> + Send + use<> {
        self.rows.clone().into_iter().map(|(_, song)| song)
    }

    /// Insert or replace. Returns the previous song with the same identifier.
    pub fn insert(&mut self, song: Song) -> Result<Option<Song>> {
        song.validate()?;
        Ok(self.rows.insert(song.id.clone(), song))
    }

    /// Insert, rejecting an identifier that is already present.
    pub fn insert_new(&mut self, song: Song) -> Result<()> {
        if self.rows.contains_key(song.id.as_str()) {
            return Err(DbError::DuplicateKey(song.id));
        }
        self.insert(song).map(|_| ())
    }

    pub fn delete(&mut self, id: &str) -> Result<Song> {
        self.rows
            .remove(id)
            .ok_or_else(|| DbError::NotFound(id.to_string()))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}
