//! The drive: a catalog, its link registry, and transfers over them.
//!
//! `Drive` is the object the server holds. It owns both stores and wires the
//! cross-store flows: issuing a link resolves the entry in the catalog first,
//! and consuming a link resolves the entry again before preparing the
//! transfer.

use std::io::{self, ErrorKind, Read, Write};
use std::path::{Component, Path, PathBuf};

use tempfile::PersistError;
use uuid::Uuid;

use crate::delegation::DelegationRegistry;
use crate::error::{CatalogError, Result};
use crate::store::{canonicalize_existing_path, validate_segment, CatalogStore, ScanReport};
use crate::transfer::Delivery;
use crate::types::extension_of;
use crate::upload::Upload;

#[derive(Debug)]
pub struct Drive {
    catalog: CatalogStore,
    links: DelegationRegistry,
    scratch_dir: PathBuf,
}

impl Drive {
    /// Creates a drive rooted at `root` that builds archives in `scratch_dir`.
    ///
    /// Both paths are canonicalized when they exist so catalog paths compare
    /// equal to what the walker produces.
    pub fn new(root: impl Into<PathBuf>, scratch_dir: impl Into<PathBuf>) -> Self {
        Self {
            catalog: CatalogStore::new(canonicalize_existing_path(root.into())),
            links: DelegationRegistry::new(),
            scratch_dir: canonicalize_existing_path(scratch_dir.into()),
        }
    }

    pub fn catalog(&self) -> &CatalogStore {
        &self.catalog
    }

    pub fn links(&self) -> &DelegationRegistry {
        &self.links
    }

    pub fn root_path(&self) -> &Path {
        self.catalog.root_path()
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    /// Rescans the configured root.
    pub fn scan(&self) -> ScanReport {
        self.catalog.scan()
    }

    /// Issues a one-time link for an indexed entry.
    pub fn issue_link(&self, entry_id: Uuid, ttl_minutes: i64, max_uses: i64) -> Result<String> {
        self.links.issue(&self.catalog, entry_id, ttl_minutes, max_uses)
    }

    /// Prepares a download for an entry without a link.
    pub fn deliver(&self, entry_id: Uuid) -> Result<Delivery> {
        let entry = self.catalog.by_id(entry_id)?;
        Delivery::prepare(&entry, &self.scratch_dir)
    }

    /// Consumes one use of `token` and prepares the bound entry's download.
    ///
    /// The use is spent even when the entry has since been deleted or the
    /// transfer cannot be prepared.
    pub fn consume_link(&self, token: &str) -> Result<Delivery> {
        let entry_id = self.links.validate(token)?;
        let entry = self.catalog.by_id(entry_id)?;
        Delivery::prepare(&entry, &self.scratch_dir)
    }

    /// Starts receiving an upload named `filename`.
    ///
    /// The bytes go to a hidden temporary file under the root until
    /// `finish_upload` moves them into place.
    pub fn begin_upload(&self, filename: &str) -> Result<Upload> {
        validate_segment(filename)?;
        Upload::create_in(self.catalog.root_path(), filename)
    }

    /// Moves a received upload into `target` and rescans.
    ///
    /// `target` is a directory inside the root, absolute or root-relative. An
    /// existing file with the same name is never overwritten: the upload is
    /// stored as `name(1).ext`, `name(2).ext`, and so on.
    pub fn finish_upload(&self, upload: Upload, target: &str) -> Result<PathBuf> {
        let dir = self.resolve_upload_dir(target)?;
        std::fs::create_dir_all(&dir).map_err(|error| CatalogError::io(&dir, error))?;

        let Upload { filename, mut temp } = upload;
        temp.flush()
            .map_err(|error| CatalogError::io(temp.path(), error))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            temp.as_file()
                .set_permissions(std::fs::Permissions::from_mode(0o644))
                .map_err(|error| CatalogError::io(temp.path(), error))?;
        }

        let extension = extension_of(&filename);
        let base = &filename[..filename.len() - extension.len()];
        let mut counter = 0u32;
        let destination = loop {
            let candidate = if counter == 0 {
                dir.join(&filename)
            } else {
                dir.join(format!("{base}({counter}){extension}"))
            };
            match temp.persist_noclobber(&candidate) {
                Ok(_) => break candidate,
                Err(PersistError { error, file }) if error.kind() == ErrorKind::AlreadyExists => {
                    temp = file;
                    counter += 1;
                }
                Err(PersistError { error, .. }) => {
                    return Err(CatalogError::io(&candidate, error))
                }
            }
        };

        log::info!("stored upload {}", destination.display());
        self.catalog.scan();
        Ok(destination)
    }

    /// Receives `data` in full and stores it as `finish_upload` does.
    pub fn store_upload(
        &self,
        target: &str,
        filename: &str,
        mut data: impl Read,
    ) -> Result<PathBuf> {
        let mut upload = self.begin_upload(filename)?;
        io::copy(&mut data, &mut upload).map_err(|error| CatalogError::io(upload.path(), error))?;
        self.finish_upload(upload, target)
    }

    fn resolve_upload_dir(&self, target: &str) -> Result<PathBuf> {
        let trimmed = target.trim();
        if trimmed.is_empty() {
            return Err(CatalogError::InvalidArgument("path not provided".to_string()));
        }
        let raw = Path::new(trimmed);
        if raw
            .components()
            .any(|component| matches!(component, Component::ParentDir))
        {
            return Err(CatalogError::InvalidArgument(format!(
                "path must not contain '..': {trimmed}"
            )));
        }

        let root = self.catalog.root_path();
        let dir = if raw.is_absolute() {
            raw.to_path_buf()
        } else {
            root.join(raw)
        };
        if !dir.starts_with(root) {
            return Err(CatalogError::InvalidArgument(format!(
                "path is outside the drive: {trimmed}"
            )));
        }
        Ok(dir)
    }
}
