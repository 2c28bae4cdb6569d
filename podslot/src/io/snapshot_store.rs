//! Layer-checksum file (`<parent>/layers`) persistence.

use std::fs;
use std::io::ErrorKind;
use std::path::Path;

use tracing::{debug, warn};

use super::atomic::write_atomic;
use crate::core::layers::BuildLayerSnapshot;
use crate::error::SlotError;

/// Load the last committed snapshot.
///
/// `Ok(None)` when nothing was ever recorded; `StateCorruption` when the
/// file exists but does not parse.
pub fn load_snapshot(path: &Path) -> Result<Option<BuildLayerSnapshot>, SlotError> {
    let contents = match fs::read_to_string(path) {
        Ok(contents) => contents,
        Err(err) if err.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "no layer snapshot recorded");
            return Ok(None);
        }
        Err(err) => return Err(SlotError::fs("read layer snapshot", path, err)),
    };
    match BuildLayerSnapshot::parse(&contents) {
        Ok(snapshot) => Ok(Some(snapshot)),
        Err(detail) => {
            warn!(path = %path.display(), %detail, "unreadable layer snapshot");
            Err(SlotError::corrupt(path, detail))
        }
    }
}

/// Atomically replace the recorded snapshot.
pub fn write_snapshot(path: &Path, snapshot: &BuildLayerSnapshot) -> Result<(), SlotError> {
    debug!(path = %path.display(), "writing layer snapshot");
    write_atomic(path, &snapshot.render())
}
