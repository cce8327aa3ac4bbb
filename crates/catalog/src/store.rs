//! Catalog storage.
//!
//! This module owns the in-memory entry collection:
//! - `walk` - Parallel filesystem walk producing observed paths in preorder
//! - `hierarchy` - Name-based parent derivation and child resolution
//! - `catalog` - The snapshot-consistent `CatalogStore`

mod catalog;
pub(crate) mod hierarchy;
mod walk;

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::error::{CatalogError, Result};

pub use catalog::{CatalogStore, ScanReport};
pub use hierarchy::{derive_parent, resolve_children};

/// Canonicalizes a path, returning it unchanged if canonicalization fails.
pub fn canonicalize_existing_path(path: PathBuf) -> PathBuf {
    fs::canonicalize(&path).unwrap_or(path)
}

/// Rejects names that are empty or would escape the containing directory.
pub(crate) fn validate_segment(name: &str) -> Result<()> {
    let mut components = Path::new(name).components();
    match (components.next(), components.next()) {
        (Some(Component::Normal(segment)), None) if segment == name => Ok(()),
        _ => Err(CatalogError::InvalidArgument(format!(
            "invalid file name: {name:?}"
        ))),
    }
}
