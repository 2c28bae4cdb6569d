//! Deterministic slot identities derived from a project path.
//!
//! A project's own identity is the checksum of its path string (index 0).
//! Slot `n` is the checksum chain walked `n` steps from there:
//! `checksum(n) = checksum_of_word(checksum(n - 1))`. Nothing about the
//! chain depends on which slots exist on disk, so any identity can always be
//! recomputed from the path alone.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use regex::Regex;

use super::checksum::{checksum_of_bytes, checksum_of_word, to_hex};
use crate::error::SlotError;

static NON_ALNUM_RE: LazyLock<Regex> = LazyLock::new(|| {
    // Literal pattern; compiling it cannot fail.
    Regex::new(r"[^a-z0-9]+").unwrap()
});

/// Identity of one host project directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProjectIdentity {
    path: PathBuf,
    path_str: String,
    base_checksum: u32,
}

impl ProjectIdentity {
    /// Build the identity for an absolute, UTF-8 project path.
    pub fn new(path: &Path) -> Result<Self, SlotError> {
        let path_str = path
            .to_str()
            .ok_or_else(|| {
                SlotError::InvalidInput(format!(
                    "project path is not valid UTF-8: {}",
                    path.display()
                ))
            })?
            .to_string();
        if path_str.is_empty() {
            return Err(SlotError::InvalidInput(
                "project path must not be empty".to_string(),
            ));
        }
        if !path.is_absolute() {
            return Err(SlotError::InvalidInput(format!(
                "project path must be absolute (got '{path_str}')"
            )));
        }
        let base_checksum = checksum_of_bytes(path_str.as_bytes());
        Ok(Self {
            path: path.to_path_buf(),
            path_str,
            base_checksum,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn path_str(&self) -> &str {
        &self.path_str
    }

    pub fn base_checksum(&self) -> u32 {
        self.base_checksum
    }

    /// Human-readable, container-safe form of the path.
    pub fn slug(&self) -> String {
        slugify(&self.path_str)
    }

    /// Checksum of slot `index` (index 0 is the project itself).
    pub fn slot_checksum(&self, index: u32) -> u32 {
        chain_checksum(self.base_checksum, index)
    }

    pub fn slot(&self, index: u32) -> SlotIdentity {
        SlotIdentity {
            index,
            checksum: self.slot_checksum(index),
        }
    }

    /// Walk slots `1..=max` in ascending order, one chain step per item.
    pub fn slots(&self, max: u32) -> SlotChain {
        SlotChain {
            current: self.base_checksum,
            next_index: 1,
            max,
        }
    }

    /// Directory name of the project's parent directory: `<slug>-<basehex>`.
    pub fn parent_dir_name(&self) -> String {
        format!("{}-{}", self.slug(), to_hex(self.base_checksum))
    }
}

/// Index and checksum of one slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SlotIdentity {
    pub index: u32,
    pub checksum: u32,
}

impl SlotIdentity {
    pub fn hex(&self) -> String {
        to_hex(self.checksum)
    }
}

impl fmt::Display for SlotIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({:08x})", self.index, self.checksum)
    }
}

/// Ascending iterator over a project's slot identities.
///
/// Restartable by calling [`ProjectIdentity::slots`] again.
#[derive(Debug, Clone)]
pub struct SlotChain {
    current: u32,
    next_index: u32,
    max: u32,
}

impl Iterator for SlotChain {
    type Item = SlotIdentity;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_index > self.max {
            return None;
        }
        self.current = checksum_of_word(self.current);
        let slot = SlotIdentity {
            index: self.next_index,
            checksum: self.current,
        };
        self.next_index += 1;
        Some(slot)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.max as usize + 1).saturating_sub(self.next_index as usize);
        (remaining, Some(remaining))
    }
}

/// Apply `checksum_of_word` to `base` exactly `steps` times.
pub fn chain_checksum(base: u32, steps: u32) -> u32 {
    (0..steps).fold(base, |c, _| checksum_of_word(c))
}

/// Collapse non-alphanumeric runs to `_` and lowercase.
///
/// Leading/trailing separators are trimmed; a path with no alphanumerics
/// (e.g. `/`) slugs to `root`.
pub fn slugify(path: &str) -> String {
    let lowered = path.to_lowercase();
    let collapsed = NON_ALNUM_RE.replace_all(&lowered, "_");
    let trimmed = collapsed.trim_matches('_');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Container name for a slot: `{prefix}-{slug}-{slothex}`.
pub fn container_name(prefix: &str, project: &ProjectIdentity, slot: &SlotIdentity) -> String {
    format!("{}-{}-{}", prefix, project.slug(), slot.hex())
}

/// Image name for a project: `{prefix}-{slug}`.
pub fn image_name(prefix: &str, project: &ProjectIdentity) -> String {
    format!("{}-{}", prefix, project.slug())
}
