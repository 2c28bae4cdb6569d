//! Atomic file replacement (temp file + rename).

use std::fs;
use std::path::Path;

use crate::error::{FsContext, SlotError};

/// Write `contents` to a sibling temp file, then rename over `path`.
///
/// Readers see either the old or the new file, never a torn write.
pub fn write_atomic(path: &Path, contents: &str) -> Result<(), SlotError> {
    let parent = path
        .parent()
        .ok_or_else(|| SlotError::corrupt(path, "path has no parent directory"))?;
    fs::create_dir_all(parent).fs_context("create directory", parent)?;
    let mut tmp_name = path
        .file_name()
        .map(|name| name.to_os_string())
        .unwrap_or_default();
    tmp_name.push(".tmp");
    let tmp_path = parent.join(tmp_name);
    fs::write(&tmp_path, contents).fs_context("write temp file", &tmp_path)?;
    fs::rename(&tmp_path, path).fs_context("replace", path)?;
    Ok(())
}
