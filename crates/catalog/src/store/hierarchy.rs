//! Parent/child relationships derived from entry names.
//!
//! Entries record the *name* of their containing directory rather than its
//! identifier, and child lookups match on that name. Two directories sharing
//! a name anywhere in the tree therefore share children. Every hierarchy query
//! goes through this module so switching to identifier-based parents touches
//! only these functions.

use std::path::Path;

use uuid::Uuid;

use crate::types::Entry;

/// Derives the parent name recorded for `path`.
///
/// This is the second-to-last path segment. The scan root and the filesystem
/// root have an empty parent, which is what makes them top-level entries.
pub fn derive_parent(path: &Path, scan_root: &Path) -> String {
    if path == scan_root {
        return String::new();
    }
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Entries whose derived parent is empty.
pub(crate) fn top_level(entries: &[Entry]) -> Vec<Entry> {
    entries
        .iter()
        .filter(|entry| entry.parent.is_empty())
        .cloned()
        .collect()
}

/// Resolves `id` to an entry and returns every entry whose parent equals its
/// name. An unknown `id` yields no children.
pub fn resolve_children(entries: &[Entry], id: Uuid) -> Vec<Entry> {
    let Some(parent) = entries.iter().find(|entry| entry.id == id) else {
        return Vec::new();
    };
    entries
        .iter()
        .filter(|entry| entry.parent == parent.name)
        .cloned()
        .collect()
}
