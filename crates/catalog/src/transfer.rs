//! Transfer preparation for downloads.
//!
//! A `Delivery` is what the caller streams back: a file on disk plus the
//! filename to suggest. Directory deliveries own a temporary archive that is
//! removed when the `Delivery` (or the guard taken from it) is dropped, so
//! cleanup happens on every exit path.

use std::fs::File;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tempfile::TempPath;

use crate::archive::archive_directory;
use crate::error::{CatalogError, Result};
use crate::types::Entry;

/// Suffix appended to directory names for archive downloads.
pub const ARCHIVE_EXTENSION: &str = "tar.gz";

#[derive(Debug)]
enum Payload {
    File(PathBuf),
    Archive(TempPath),
}

/// A prepared download.
#[derive(Debug)]
pub struct Delivery {
    filename: String,
    payload: Payload,
}

impl Delivery {
    /// Prepares `entry` for transfer.
    ///
    /// Directories are archived into a uniquely named file inside
    /// `scratch_dir`. Files are checked for readability and served in place.
    pub fn prepare(entry: &Entry, scratch_dir: &Path) -> Result<Self> {
        if entry.is_dir {
            let temp = tempfile::Builder::new()
                .prefix(&format!("{}-", entry.name))
                .suffix(&format!(".{ARCHIVE_EXTENSION}"))
                .tempfile_in(scratch_dir)
                .map_err(|error| CatalogError::io(scratch_dir, error))?
                .into_temp_path();
            // On failure `temp` drops here and takes the partial archive with it.
            archive_directory(&entry.path, &temp)?;
            log::debug!(
                "prepared archive {} for {}",
                temp.display(),
                entry.path.display()
            );
            Ok(Self {
                filename: format!("{}.{ARCHIVE_EXTENSION}", entry.name),
                payload: Payload::Archive(temp),
            })
        } else {
            let file =
                File::open(&entry.path).map_err(|error| CatalogError::io(&entry.path, error))?;
            let metadata = file
                .metadata()
                .map_err(|error| CatalogError::io(&entry.path, error))?;
            // Opening succeeds on directories too, e.g. behind a symlink.
            if !metadata.is_file() {
                return Err(CatalogError::io(
                    &entry.path,
                    io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"),
                ));
            }
            Ok(Self {
                filename: entry.name.clone(),
                payload: Payload::File(entry.path.clone()),
            })
        }
    }

    /// Suggested filename for the download.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Path of the bytes to send.
    pub fn path(&self) -> &Path {
        match &self.payload {
            Payload::File(path) => path.as_path(),
            Payload::Archive(temp) => &**temp,
        }
    }

    pub fn is_archive(&self) -> bool {
        matches!(self.payload, Payload::Archive(_))
    }

    /// Opens the payload for reading.
    pub fn open(&self) -> Result<File> {
        File::open(self.path()).map_err(|error| CatalogError::io(self.path(), error))
    }

    /// Copies the payload into `writer`, then releases any temporary archive.
    pub fn write_to<W: Write>(self, writer: &mut W) -> Result<u64> {
        let mut file = self.open()?;
        io::copy(&mut file, writer).map_err(|error| CatalogError::io(self.path(), error))
    }

    /// Splits the delivery into the path to stream, the suggested filename and
    /// a guard that removes the temporary archive when dropped.
    pub fn into_parts(self) -> (PathBuf, String, Option<TempPath>) {
        match self.payload {
            Payload::File(path) => (path, self.filename, None),
            Payload::Archive(temp) => (temp.to_path_buf(), self.filename, Some(temp)),
        }
    }
}
