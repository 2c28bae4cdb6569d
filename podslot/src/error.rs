//! Error taxonomy for slot and build-cache operations.

use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Failure of a single slot-store or build-cache operation.
///
/// No variant is fatal to the process; callers report it and move on.
#[derive(Debug, Error)]
pub enum SlotError {
    /// Malformed slot index, empty or relative project path, bad config value.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The container runtime could not be queried (missing binary, daemon
    /// down, timeout). Never downgraded to "not running".
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// Persisted state does not have the expected shape.
    #[error("corrupt state at {}: {detail}", path.display())]
    StateCorruption { path: PathBuf, detail: String },

    /// Create/read/write/delete failure on the filesystem.
    #[error("{action} {}: {source}", path.display())]
    Filesystem {
        action: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Revoking when the counter is 0.
    #[error("no slots exist yet")]
    NoSlots,
}

impl SlotError {
    pub fn fs(action: &'static str, path: &Path, source: io::Error) -> Self {
        Self::Filesystem {
            action,
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn corrupt(path: &Path, detail: impl Into<String>) -> Self {
        Self::StateCorruption {
            path: path.to_path_buf(),
            detail: detail.into(),
        }
    }
}

/// Attach a filesystem action and path to an `io::Result`.
pub(crate) trait FsContext<T> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T, SlotError>;
}

impl<T> FsContext<T> for io::Result<T> {
    fn fs_context(self, action: &'static str, path: &Path) -> Result<T, SlotError> {
        self.map_err(|source| SlotError::fs(action, path, source))
    }
}
