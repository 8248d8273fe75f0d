//! Error types for the disk provider

use std::io;
use std::path::PathBuf;

use bridge_traits::AdapterError;
use thiserror::Error;

/// Disk provider errors
#[derive(Error, Debug)]
pub enum DiskError {
    /// A configuration value is missing or malformed
    #[error("Invalid disk source configuration: {0}")]
    Configuration(String),

    /// `filenameFilter` is not a valid regular expression
    #[error("Invalid filename filter [{pattern}]")]
    InvalidFilter {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    #[error("Disk source [{}] does not exist", .0.display())]
    MissingRoot(PathBuf),

    #[error("Not permitted to read disk source [{}]", .path.display())]
    NotReadable {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Disk source [{}] is not a directory", .0.display())]
    NotADirectory(PathBuf),

    /// The location does not stay inside the root directory
    #[error("Location [{0}] is outside of the disk source")]
    InvalidLocation(String),

    #[error("Disk source is not initialized")]
    NotInitialized,

    /// I/O failure while reading the tree
    #[error("I/O error on [{}]", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// Result type for disk provider operations
pub type Result<T> = std::result::Result<T, DiskError>;

impl DiskError {
    pub(crate) fn io(path: impl Into<PathBuf>) -> impl FnOnce(io::Error) -> DiskError {
        let path = path.into();
        move |source| DiskError::Io { path, source }
    }
}

impl From<DiskError> for AdapterError {
    fn from(error: DiskError) -> Self {
        match error {
            // Only I/O is a transport problem; the engine retries it
            DiskError::Io { path, source } => AdapterError::Transport(io::Error::new(
                source.kind(),
                format!("{}: {}", path.display(), source),
            )),
            DiskError::Configuration(_) | DiskError::InvalidFilter { .. } => {
                AdapterError::Configuration(error.to_string())
            }
            DiskError::MissingRoot(_)
            | DiskError::NotReadable { .. }
            | DiskError::NotADirectory(_)
            | DiskError::InvalidLocation(_) => AdapterError::Remote(error.to_string()),
            DiskError::NotInitialized => AdapterError::Other(error.to_string()),
        }
    }
}
