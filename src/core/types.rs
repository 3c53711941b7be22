use super::{DbError, Result};
use serde::{Deserialize, Serialize};

/// A catalog entry: one sound with its descriptive fields.
///
/// Field order here is the field order in the snapshot document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Location of the stored sound file, empty until the content is persisted.
    #[serde(default)]
    pub path: String,
}

impl Song {
    /// Create a song with a freshly generated identifier.
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self::with_id(new_song_id(), title, description)
    }

    /// Create a song with a caller-supplied identifier.
    pub fn with_id(
        id: impl Into<String>,
        title: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: description.into(),
            path: String::new(),
        }
    }

    pub fn path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    pub fn has_path(&self) -> bool {
        !self.path.is_empty()
    }

    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(DbError::ConstraintViolation(
                "Song identifier cannot be empty".to_string(),
            ));
        }
        if self.title.trim().is_empty() {
            return Err(DbError::ConstraintViolation(format!(
                "Song '{}' must have a title",
                self.id
            )));
        }
        Ok(())
    }
}

impl std::fmt::Display for Song {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ID:{} Title:{} PATH: {}", self.id, self.title, self.path)
    }
}

/// Globally unique, opaque song identifier.
pub fn new_song_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}
