//! Catalog record types.
//!
//! These are the values handed out by the store. The server crate serializes
//! them directly, so field names follow the wire format.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::store::hierarchy::derive_parent;

/// One indexed filesystem object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    pub id: Uuid,
    pub name: String,
    /// Extension including the leading dot, or empty.
    pub ext: String,
    pub is_dir: bool,
    pub path: PathBuf,
    pub last_mod: DateTime<Utc>,
    /// Name of the containing directory, empty for the scan root.
    pub parent: String,
}

impl Entry {
    /// Builds a fresh entry for a path observed during a scan.
    pub fn observed(path: &Path, metadata: &fs::Metadata, scan_root: &Path) -> Self {
        let name = entry_name(path);
        Self {
            id: Uuid::new_v4(),
            ext: extension_of(&name),
            name,
            is_dir: metadata.is_dir(),
            path: path.to_path_buf(),
            last_mod: modified_at(metadata),
            parent: derive_parent(path, scan_root),
        }
    }

    /// Returns the search projection of this entry.
    pub fn to_search_entry(&self) -> SearchEntry {
        SearchEntry {
            id: self.id,
            name: self.name.clone(),
            is_dir: self.is_dir,
            ext: self.ext.clone(),
        }
    }
}

/// Reduced projection returned by name search. Carries no filesystem path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchEntry {
    pub id: Uuid,
    pub name: String,
    pub is_dir: bool,
    pub ext: String,
}

/// Final path segment, falling back to the whole path for roots like `/`.
pub(crate) fn entry_name(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Extension of a file name starting at the last dot, dot included.
///
/// Dotfiles count as all-extension (`.bashrc` → `.bashrc`).
pub(crate) fn extension_of(name: &str) -> String {
    name.rfind('.')
        .map(|index| name[index..].to_string())
        .unwrap_or_default()
}

fn modified_at(metadata: &fs::Metadata) -> DateTime<Utc> {
    metadata
        .modified()
        .map(DateTime::<Utc>::from)
        .unwrap_or(DateTime::<Utc>::UNIX_EPOCH)
}
