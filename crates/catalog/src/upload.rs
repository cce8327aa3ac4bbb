//! Incoming uploads.
//!
//! Bytes are received into a hidden temporary file under the drive root and
//! only moved to their final name once complete. An `Upload` dropped before
//! it is finished takes its temporary file with it.

use std::ffi::OsStr;
use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::{CatalogError, Result};

/// Name prefix of in-progress upload files. Scans skip them.
pub const UPLOAD_TEMP_PREFIX: &str = ".drive-upload-";

pub(crate) fn is_upload_temp(name: &OsStr) -> bool {
    name.to_str()
        .is_some_and(|name| name.starts_with(UPLOAD_TEMP_PREFIX))
}

/// An upload being received.
#[derive(Debug)]
pub struct Upload {
    pub(crate) filename: String,
    pub(crate) temp: NamedTempFile,
}

impl Upload {
    pub(crate) fn create_in(dir: &Path, filename: &str) -> Result<Self> {
        let temp = tempfile::Builder::new()
            .prefix(UPLOAD_TEMP_PREFIX)
            .tempfile_in(dir)
            .map_err(|error| CatalogError::io(dir, error))?;
        Ok(Self {
            filename: filename.to_string(),
            temp,
        })
    }

    /// Name the client asked for.
    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Path of the temporary file receiving the bytes.
    pub fn path(&self) -> &Path {
        self.temp.path()
    }

    /// A second handle on the temporary file, for writers that need an owned
    /// `File` (for example an async one).
    pub fn reopen(&self) -> Result<File> {
        self.temp
            .reopen()
            .map_err(|error| CatalogError::io(self.temp.path(), error))
    }
}

impl Write for Upload {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.temp.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.temp.flush()
    }
}
