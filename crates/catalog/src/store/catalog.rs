//! Snapshot-consistent catalog store.

use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use uuid::Uuid;

use super::hierarchy::{derive_parent, resolve_children, top_level};
use super::validate_segment;
use super::walk::{flatten, walk_it, WalkData};
use crate::error::{CatalogError, Result};
use crate::types::{extension_of, Entry, SearchEntry};

/// Outcome of a scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanReport {
    /// Root path that was walked.
    pub root: PathBuf,
    /// Number of filesystem nodes visited.
    pub visited: usize,
    /// Number of entries added to the catalog.
    pub added: usize,
    /// Number of walk errors that were skipped.
    pub errors: usize,
    /// Total entries in the catalog after the merge.
    pub total: usize,
}

/// The in-memory catalog.
///
/// Readers take a cheap clone of the current `Arc` snapshot and never wait on
/// filesystem work. Writers are serialized by `write_lane`, do their
/// filesystem work, then publish a new snapshot in a single swap.
#[derive(Debug)]
pub struct CatalogStore {
    root: PathBuf,
    entries: RwLock<Arc<Vec<Entry>>>,
    write_lane: Mutex<()>,
}

impl CatalogStore {
    /// Creates an empty catalog for the given configured root.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            entries: RwLock::new(Arc::new(Vec::new())),
            write_lane: Mutex::new(()),
        }
    }

    /// The configured root path.
    pub fn root_path(&self) -> &Path {
        &self.root
    }

    /// Returns the current snapshot.
    pub fn snapshot(&self) -> Arc<Vec<Entry>> {
        self.entries.read().clone()
    }

    fn publish(&self, next: Vec<Entry>) {
        *self.entries.write() = Arc::new(next);
    }

    /// Walks the configured root and merges every path not yet in the catalog.
    ///
    /// Existing entries keep their identifiers and metadata. Entries whose
    /// paths disappeared are left in place.
    pub fn scan(&self) -> ScanReport {
        let _lane = self.write_lane.lock();
        let started = Instant::now();
        let root = self.root.as_path();

        let walk_data = WalkData::new(root);
        let observed = walk_it(&walk_data).map(flatten).unwrap_or_default();

        let current = self.snapshot();
        let known: HashSet<&Path> = current.iter().map(|entry| entry.path.as_path()).collect();
        let fresh: Vec<Entry> = observed
            .iter()
            .filter(|(path, _)| !known.contains(path.as_path()))
            .map(|(path, metadata)| Entry::observed(path, metadata, &self.root))
            .collect();

        let added = fresh.len();
        let total = current.len() + added;
        if added > 0 {
            let mut next = Vec::with_capacity(total);
            next.extend(current.iter().cloned());
            next.extend(fresh);
            self.publish(next);
        }

        let report = ScanReport {
            root: root.to_path_buf(),
            visited: walk_data.visited(),
            added,
            errors: walk_data.error_count(),
            total,
        };
        log::info!(
            "catalog scan root={} visited={} added={} errors={} total={} elapsed_ms={}",
            root.display(),
            report.visited,
            report.added,
            report.errors,
            report.total,
            started.elapsed().as_millis(),
        );
        report
    }

    /// Returns a copy of every entry.
    pub fn all(&self) -> Vec<Entry> {
        self.snapshot().as_ref().clone()
    }

    /// Number of indexed entries.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn by_id(&self, id: Uuid) -> Result<Entry> {
        self.snapshot()
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("file {id}")))
    }

    /// Entries with an empty derived parent.
    pub fn root(&self) -> Vec<Entry> {
        top_level(&self.snapshot())
    }

    /// Entries whose derived parent equals the name of entry `id`.
    pub fn children(&self, id: Uuid) -> Vec<Entry> {
        resolve_children(&self.snapshot(), id)
    }

    /// Case-sensitive substring search on entry names.
    pub fn search(&self, query: &str) -> Vec<SearchEntry> {
        self.snapshot()
            .iter()
            .filter(|entry| entry.name.contains(query))
            .map(Entry::to_search_entry)
            .collect()
    }

    /// Renames the backing file and updates the entry.
    ///
    /// Descendants of a renamed directory are moved along with it. Nothing in
    /// the catalog changes unless the filesystem rename succeeds.
    pub fn rename(&self, id: Uuid, new_name: &str) -> Result<Entry> {
        validate_segment(new_name)?;

        let _lane = self.write_lane.lock();
        let current = self.snapshot();
        let entry = current
            .iter()
            .find(|entry| entry.id == id)
            .ok_or_else(|| CatalogError::NotFound(format!("file {id}")))?;

        if entry.path == self.root {
            return Err(CatalogError::Forbidden(
                "cannot rename the root drive folder".to_string(),
            ));
        }

        let old_path = entry.path.clone();
        let new_path = old_path
            .parent()
            .map(|dir| dir.join(new_name))
            .unwrap_or_else(|| PathBuf::from(new_name));
        if new_path == old_path {
            return Ok(entry.clone());
        }
        // Entries for vanished paths are kept, so the catalog can hold the
        // target even when the disk does not.
        let indexed = current
            .iter()
            .any(|item| item.id != id && item.path.starts_with(&new_path));
        if indexed || fs::symlink_metadata(&new_path).is_ok() {
            return Err(CatalogError::InvalidArgument(format!(
                "{} already exists",
                new_path.display()
            )));
        }

        fs::rename(&old_path, &new_path).map_err(|error| CatalogError::io(&old_path, error))?;

        let mut renamed = None;
        let next: Vec<Entry> = current
            .iter()
            .map(|item| {
                let mut item = item.clone();
                if item.id == id {
                    item.name = new_name.to_string();
                    item.ext = extension_of(new_name);
                    item.path = new_path.clone();
                    renamed = Some(item.clone());
                } else if let Ok(relative) = item.path.strip_prefix(&old_path) {
                    item.path = new_path.join(relative);
                    item.parent = derive_parent(&item.path, &self.root);
                }
                item
            })
            .collect();
        self.publish(next);

        log::debug!("renamed {} -> {}", old_path.display(), new_path.display());
        renamed.ok_or_else(|| CatalogError::NotFound(format!("file {id}")))
    }

    /// Removes the backing file (recursively for directories) and its entries.
    ///
    /// The configured root can never be deleted. If the filesystem removal
    /// fails the catalog is left untouched.
    pub fn delete(&self, id: Uuid) -> Result<Entry> {
        let _lane = self.write_lane.lock();
        let current = self.snapshot();
        let entry = current
            .iter()
            .find(|entry| entry.id == id)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(format!("file {id}")))?;

        if self.root.starts_with(&entry.path) {
            return Err(CatalogError::Forbidden(
                "cannot delete the root drive folder".to_string(),
            ));
        }

        remove_path(&entry.path)?;

        let next: Vec<Entry> = current
            .iter()
            .filter(|item| item.id != id && !item.path.starts_with(&entry.path))
            .cloned()
            .collect();
        let removed = current.len() - next.len();
        self.publish(next);

        log::debug!("deleted {} ({removed} entries)", entry.path.display());
        Ok(entry)
    }
}

/// Removes a file or directory tree. A path that is already gone counts as
/// removed.
fn remove_path(path: &Path) -> Result<()> {
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(CatalogError::io(path, error)),
    };
    let removed = if metadata.is_dir() {
        fs::remove_dir_all(path)
    } else {
        fs::remove_file(path)
    };
    removed.map_err(|error| CatalogError::io(path, error))
}
