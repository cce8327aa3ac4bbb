//! Filesystem walking for catalog scans.
//!
//! The walk builds a `Node` tree with children sorted by name, then flattens
//! it in preorder so entries are merged in lexicographic path order. Walk
//! errors are logged and counted; an unreadable subtree never aborts the scan.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;

use crate::upload::is_upload_temp;

/// A node in the tree built during walking.
#[derive(Debug)]
pub(crate) struct Node {
    pub path: PathBuf,
    pub metadata: fs::Metadata,
    /// Child nodes, sorted by path.
    pub children: Vec<Node>,
}

/// Counters shared by the parallel walker.
#[derive(Debug)]
pub(crate) struct WalkData<'a> {
    pub root_path: &'a Path,
    pub num_files: AtomicUsize,
    pub num_dirs: AtomicUsize,
    pub errors: AtomicUsize,
}

impl<'a> WalkData<'a> {
    pub fn new(root_path: &'a Path) -> Self {
        Self {
            root_path,
            num_files: AtomicUsize::new(0),
            num_dirs: AtomicUsize::new(0),
            errors: AtomicUsize::new(0),
        }
    }

    pub fn visited(&self) -> usize {
        self.num_files.load(Ordering::Relaxed) + self.num_dirs.load(Ordering::Relaxed)
    }

    pub fn error_count(&self) -> usize {
        self.errors.load(Ordering::Relaxed)
    }

    fn record_error(&self, path: &Path, error: &std::io::Error) {
        self.errors.fetch_add(1, Ordering::Relaxed);
        log::warn!("walk error at {}: {}", path.display(), error);
    }
}

/// Walks the tree rooted at `walk_data.root_path`.
///
/// Returns `None` when the root itself cannot be accessed.
pub(crate) fn walk_it(walk_data: &WalkData) -> Option<Node> {
    walk(walk_data.root_path, walk_data)
}

/// Flattens a node tree into `(path, metadata)` pairs in preorder.
pub(crate) fn flatten(root: Node) -> Vec<(PathBuf, fs::Metadata)> {
    let mut out = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        let Node {
            path,
            metadata,
            children,
        } = node;
        out.push((path, metadata));
        // Reverse so the smallest child is popped first.
        stack.extend(children.into_iter().rev());
    }
    out
}

fn walk(path: &Path, walk_data: &WalkData) -> Option<Node> {
    // Symlinks are recorded, never followed.
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) => {
            walk_data.record_error(path, &error);
            return None;
        }
    };

    if !metadata.is_dir() {
        walk_data.num_files.fetch_add(1, Ordering::Relaxed);
        return Some(Node {
            path: path.to_path_buf(),
            metadata,
            children: Vec::new(),
        });
    }

    walk_data.num_dirs.fetch_add(1, Ordering::Relaxed);
    let read_dir = match fs::read_dir(path) {
        Ok(iter) => iter,
        Err(error) => {
            // Keep the directory itself, just without children.
            walk_data.record_error(path, &error);
            return Some(Node {
                path: path.to_path_buf(),
                metadata,
                children: Vec::new(),
            });
        }
    };

    let mut child_paths = Vec::new();
    for child in read_dir {
        match child {
            Ok(child) if is_upload_temp(&child.file_name()) => {}
            Ok(child) => child_paths.push(child.path()),
            Err(error) => walk_data.record_error(path, &error),
        }
    }

    let mut children: Vec<Node> = child_paths
        .into_par_iter()
        .filter_map(|child_path| walk(&child_path, walk_data))
        .collect();
    children.sort_unstable_by(|a, b| a.path.cmp(&b.path));

    Some(Node {
        path: path.to_path_buf(),
        metadata,
        children,
    })
}
