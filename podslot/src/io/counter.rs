//! SlotCounter persistence (`<parent>/counter`).
//!
//! The file holds a single ASCII integer with no trailing content: the
//! highest slot index ever allocated and not yet pruned.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::debug;

use super::atomic::write_atomic;
use crate::error::SlotError;

/// Load the counter. A missing file means no slot was ever allocated.
pub fn load_counter(path: &Path) -> Result<u32, SlotError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no counter file, starting at 0");
            return Ok(0);
        }
        Err(err) => return Err(SlotError::fs("read counter", path, err)),
    };
    let value = parse_counter(&contents).ok_or_else(|| {
        SlotError::corrupt(
            path,
            format!("counter is not a non-negative integer: {:?}", contents.trim()),
        )
    })?;
    debug!(path = %path.display(), counter = value, "counter loaded");
    Ok(value)
}

/// Atomically persist the counter.
pub fn write_counter(path: &Path, value: u32) -> Result<(), SlotError> {
    debug!(path = %path.display(), counter = value, "writing counter");
    write_atomic(path, &value.to_string())
}

fn parse_counter(contents: &str) -> Option<u32> {
    let trimmed = contents.trim();
    if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    trimmed.parse().ok()
}
