//! Full-snapshot persistence for the song table.

use crate::core::{DbError, Result, Song};
use crate::storage::table::Table;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

pub const SNAPSHOT_FORMAT_VERSION: u32 = 1;

// ============================================================================
// Snapshot Document
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDocument {
    pub version: u32,
    #[serde(default)]
    pub saved_at: Option<DateTime<Utc>>,
    pub songs: Vec<Song>,
}

impl SnapshotDocument {
    pub fn new(songs: Vec<Song>) -> Self {
        Self {
            version: SNAPSHOT_FORMAT_VERSION,
            saved_at: Some(Utc::now()),
            songs,
        }
    }

    /// Parse either the current document or a bare array of songs.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let value: serde_json::Value = serde_json::from_slice(bytes)
            .map_err(|e| DbError::Deserialization(e.to_string()))?;

        if value.is_array() {
            let songs: Vec<Song> = serde_json::from_value(value)
                .map_err(|e| DbError::Deserialization(e.to_string()))?;
            return Ok(Self {
                version: 0,
                saved_at: None,
                songs,
            });
        }

        let document: SnapshotDocument = serde_json::from_value(value)
            .map_err(|e| DbError::Deserialization(e.to_string()))?;
        if document.version > SNAPSHOT_FORMAT_VERSION {
            return Err(DbError::Deserialization(format!(
                "Unsupported snapshot version {} (newest known is {})",
                document.version, SNAPSHOT_FORMAT_VERSION
            )));
        }
        Ok(document)
    }
}

// ============================================================================
// Snapshot Manager
// ============================================================================

pub struct SnapshotManager {
    snapshot_path: PathBuf,
    pretty: bool,
}

impl SnapshotManager {
    pub fn new<P: AsRef<Path>>(snapshot_path: P) -> Self {
        Self {
            snapshot_path: snapshot_path.as_ref().to_path_buf(),
            pretty: true,
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = pretty;
        self
    }

    pub fn path(&self) -> &Path {
        &self.snapshot_path
    }

    /// Write every song of `table` in identifier order, replacing the file.
    ///
    /// The document goes to a temporary file next to the target and is
    /// renamed over it, so a failed save leaves the previous snapshot intact.
    pub fn save(&self, table: &Table) -> Result<usize> {
        let document = SnapshotDocument::new(table.iter().collect());
        let count = document.songs.len();

        let dir = self
            .snapshot_path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(dir).map_err(|e| {
            DbError::IoError(format!(
                "Failed to create snapshot directory '{}': {}",
                dir.display(),
                e
            ))
        })?;

        let temp = tempfile::NamedTempFile::new_in(dir)
            .map_err(|e| DbError::IoError(format!("Failed to create temp file: {}", e)))?;
        {
            let mut writer = BufWriter::new(temp.as_file());
            let written = if self.pretty {
                serde_json::to_writer_pretty(&mut writer, &document)
            } else {
                serde_json::to_writer(&mut writer, &document)
            };
            written.map_err(|e| DbError::Serialization(e.to_string()))?;
            writer
                .write_all(b"\n")
                .and_then(|_| writer.flush())
                .map_err(|e| DbError::IoError(format!("Failed to write snapshot: {}", e)))?;
        }
        temp.as_file()
            .sync_all()
            .map_err(|e| DbError::IoError(format!("Failed to sync snapshot: {}", e)))?;
        temp.persist(&self.snapshot_path).map_err(|e| {
            DbError::IoError(format!(
                "Failed to replace snapshot '{}': {}",
                self.snapshot_path.display(),
                e.error
            ))
        })?;

        info!(path = %self.snapshot_path.display(), songs = count, "snapshot saved");
        Ok(count)
    }

    /// Read the snapshot and return its songs in file order.
    pub fn load(&self) -> Result<Vec<Song>> {
        let bytes = match fs::read(&self.snapshot_path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(DbError::SnapshotNotFound(self.snapshot_path.clone()));
            }
            Err(e) => {
                return Err(DbError::IoError(format!(
                    "Failed to read snapshot '{}': {}",
                    self.snapshot_path.display(),
                    e
                )));
            }
        };

        let document = SnapshotDocument::from_slice(&bytes)?;
        for song in &document.songs {
            debug!(id = %song.id, title = %song.title, path = %song.path, "snapshot entry");
        }
        info!(
            path = %self.snapshot_path.display(),
            songs = document.songs.len(),
            version = document.version,
            "snapshot loaded"
        );
        Ok(document.songs)
    }

    pub fn exists(&self) -> bool {
        self.snapshot_path.exists()
    }

    pub fn delete(&self) -> Result<()> {
        if self.snapshot_path.exists() {
            fs::remove_file(&self.snapshot_path).map_err(|e| {
                DbError::IoError(format!("Failed to delete snapshot: {}", e))
            })?;
        }
        Ok(())
    }
}
