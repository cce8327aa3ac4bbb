use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Link expired")]
    Expired,

    #[error("Link has no downloads left")]
    Exhausted,

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl CatalogError {
    /// Wraps an I/O error with the path it occurred on.
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    /// Short machine-readable code for the error kind.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NotFound(_) => "not_found",
            Self::Expired => "expired",
            Self::Exhausted => "exhausted",
            Self::Forbidden(_) => "forbidden",
            Self::Io { .. } => "io",
        }
    }
}

pub type Result<T> = std::result::Result<T, CatalogError>;
