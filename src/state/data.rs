//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between
//! the catalog layer, the thumbnail cache and the presentation reducers.
use std::fmt;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";

/// Opaque playable reference handed to the playback engine and the
/// frame extractor. Local files use the `file://` form.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Location(String);

impl Location {
    pub fn new(uri: impl Into<String>) -> Self {
        Location(uri.into())
    }

    /// Build a `file://` reference from a filesystem path
    pub fn from_path(path: &Path) -> Self {
        Location(format!("{}{}", FILE_SCHEME, path.display()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Resolve back to a local path. Bare paths (no scheme) are accepted too.
    /// Returns None for any other scheme.
    pub fn to_file_path(&self) -> Option<PathBuf> {
        if let Some(rest) = self.0.strip_prefix(FILE_SCHEME) {
            return Some(PathBuf::from(rest));
        }
        if self.0.contains("://") {
            return None;
        }
        Some(PathBuf::from(&self.0))
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Represents a single video returned by a catalog query
#[derive(Debug, Clone, PartialEq)]
pub struct VideoEntry {
    /// Catalog ID in string form (e.g., "42")
    pub id: String,
    /// Display name as indexed; may be empty
    pub title: String,
    /// Playable reference for the engine and the frame extractor
    pub location: Location,
    /// Thumbnail supplied by the index itself (None if the index has none)
    pub thumbnail_location: Option<Location>,
    pub duration_ms: u64,
    pub size_bytes: u64,
    /// Raw filesystem path, display only
    pub path: String,
}

/// A row to be inserted into the catalog
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub display_name: Option<String>,
    pub path: String,
    pub duration_ms: u64,
    pub size_bytes: u64,
    /// Unix seconds; the catalog orders by this, newest first
    pub date_added: i64,
}
