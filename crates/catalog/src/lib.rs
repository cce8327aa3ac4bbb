//! In-memory drive catalog and one-time download links.
//!
//! This crate provides the core of the drive service:
//! - A flat, snapshot-consistent catalog of filesystem entries built by scanning
//!   a root directory
//! - Name-derived hierarchy queries (root, children) and name search
//! - A registry of one-time links that grant time- and use-limited downloads
//! - Transfer preparation that streams files or archives directories
//! - Uploads received off to the side and moved into place when complete

pub mod archive;
pub mod delegation;
pub mod drive;
pub mod error;
pub mod ids;
pub mod store;
pub mod transfer;
pub mod types;
pub mod upload;

// Re-export main types
pub use delegation::{DelegationRegistry, DelegationToken};
pub use drive::Drive;
pub use error::{CatalogError, Result};
pub use ids::{generate_link_token, parse_entry_id, parse_positive_int};
pub use store::{CatalogStore, ScanReport};
pub use transfer::{Delivery, ARCHIVE_EXTENSION};
pub use types::{Entry, SearchEntry};
pub use upload::{Upload, UPLOAD_TEMP_PREFIX};
