// Session storage on disk

pub mod storage;

pub use storage::*;

use std::path::PathBuf;

/// Error type for persisting recordings
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("Recording root does not exist (not mounted?): {0}")]
    RootMissing(PathBuf),

    #[error("IO error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, StorageError>;
