//! Directory archiving for downloads.
//!
//! Directories are delivered as gzip-compressed tar archives. Paths inside the
//! archive are relative to the archived directory, and every subdirectory is
//! recorded with a trailing `/` so empty directories survive extraction.

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::Path;

use flate2::{write::GzEncoder, Compression};
use tar::{EntryType, Header};
use walkdir::WalkDir;

use crate::error::{CatalogError, Result};
use crate::upload::is_upload_temp;

/// Writes `source` and everything below it to a `.tar.gz` at `dest`.
///
/// Any walk, read or write failure aborts the archive. Whatever was written to
/// `dest` before the failure is not a usable archive.
pub fn archive_directory(source: &Path, dest: &Path) -> Result<u64> {
    let file = File::create(dest).map_err(|error| CatalogError::io(dest, error))?;
    let encoder = GzEncoder::new(BufWriter::new(file), Compression::default());
    let mut builder = tar::Builder::new(encoder);
    builder.follow_symlinks(false);

    let mut archived = 0u64;
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(source).to_path_buf();
            CatalogError::io(path, error.into())
        })?;
        let path = entry.path();
        if path == dest || is_upload_temp(entry.file_name()) {
            continue;
        }
        let relative = path
            .strip_prefix(source)
            .map_err(|_| {
                CatalogError::InvalidArgument(format!("{} escapes archive root", path.display()))
            })?;
        if relative.as_os_str().is_empty() {
            continue;
        }
        let name = archive_name(relative);

        let metadata =
            fs::symlink_metadata(path).map_err(|error| CatalogError::io(path, error))?;
        let file_type = metadata.file_type();
        if file_type.is_dir() {
            let mut header = Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_entry_type(EntryType::Directory);
            header.set_size(0);
            builder
                .append_data(&mut header, format!("{name}/"), std::io::empty())
                .map_err(|error| CatalogError::io(dest, error))?;
        } else if file_type.is_symlink() {
            let target = fs::read_link(path).map_err(|error| CatalogError::io(path, error))?;
            let mut header = Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_entry_type(EntryType::Symlink);
            header.set_size(0);
            builder
                .append_link(&mut header, &name, &target)
                .map_err(|error| CatalogError::io(dest, error))?;
        } else {
            let mut header = Header::new_gnu();
            header.set_metadata(&metadata);
            header.set_entry_type(EntryType::Regular);
            let file = File::open(path).map_err(|error| CatalogError::io(path, error))?;
            builder
                .append_data(&mut header, &name, file)
                .map_err(|error| CatalogError::io(path, error))?;
        }
        archived += 1;
    }

    let encoder = builder
        .into_inner()
        .map_err(|error| CatalogError::io(dest, error))?;
    let mut writer = encoder
        .finish()
        .map_err(|error| CatalogError::io(dest, error))?;
    writer.flush().map_err(|error| CatalogError::io(dest, error))?;

    log::debug!(
        "archived {} entries from {} into {}",
        archived,
        source.display(),
        dest.display()
    );
    Ok(archived)
}

/// Forward-slash archive path for a relative filesystem path.
fn archive_name(relative: &Path) -> String {
    relative
        .components()
        .map(|component| component.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
