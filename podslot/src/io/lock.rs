//! Advisory lock scoped to one project's parent directory.
//!
//! Held for the duration of every mutating operation. The lock is tied to
//! the open file handle, so dropping the guard releases it on every exit
//! path, including early returns with `?`.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};

use fs4::FileExt;
use tracing::debug;

use crate::error::{FsContext, SlotError};

#[derive(Debug)]
pub struct ProjectLock {
    _file: File,
    path: PathBuf,
}

impl ProjectLock {
    /// Block until the exclusive lock at `path` is acquired.
    pub fn acquire(path: &Path) -> Result<Self, SlotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).fs_context("create directory", parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .fs_context("open lock file", path)?;
        debug!(path = %path.display(), "acquiring project lock");
        FileExt::lock_exclusive(&file).fs_context("lock", path)?;
        debug!(path = %path.display(), "project lock held");
        Ok(Self {
            _file: file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ProjectLock {
    fn drop(&mut self) {
        debug!(path = %self.path.display(), "releasing project lock");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lock_is_reacquirable_after_drop() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("proj").join(".lock");
        {
            let lock = ProjectLock::acquire(&path).expect("first lock");
            assert_eq!(lock.path(), path.as_path());
        }
        let _again = ProjectLock::acquire(&path).expect("second lock");
        assert!(path.exists());
    }

    #[test]
    fn held_lock_blocks_other_handles() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join(".lock");
        let _held = ProjectLock::acquire(&path).expect("lock");
        let other = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .expect("open second handle");
        assert!(FileExt::try_lock_exclusive(&other).is_err());
    }
}
