//! Error kinds shared by the partitioning and taxonomy pipelines.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Every failure is fatal to the enclosing call; nothing is retried here.
#[derive(Debug, Error)]
pub enum PartitionError {
    /// Malformed ratios, counts, or option combinations.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The source dataset yielded no images to partition.
    #[error("no images found to partition under {}", .0.display())]
    EmptyDataset(PathBuf),

    /// Image and label pools cannot be paired item for item.
    #[error("image/label correspondence violated: {0}")]
    CorrespondenceViolation(String),

    /// The taxonomy sidecar lacks the class-list field.
    #[error("'{key}' key not found in {}", .path.display())]
    MissingTaxonomyKey { path: PathBuf, key: String },

    /// The class-list field exists but is not a list of class names.
    #[error("malformed taxonomy in {}: {reason}", .path.display())]
    MalformedTaxonomy { path: PathBuf, reason: String },

    /// Read, write, copy, or move failure on a concrete path.
    #[error("I/O failure on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl PartitionError {
    pub fn invalid_argument(reason: impl Into<String>) -> Self {
        Self::InvalidArgument(reason.into())
    }

    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn malformed(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::MalformedTaxonomy {
            path: path.as_ref().to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PartitionError>;

/// Attach the offending path to an `io::Result`.
pub(crate) trait IoContext<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn at(self, path: impl AsRef<Path>) -> Result<T> {
        self.map_err(|e| PartitionError::io(path, e))
    }
}
