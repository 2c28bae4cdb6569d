//! Shared deterministic types for slot lifecycle logic.
//!
//! These types define stable contracts between the store, the CLI, and JSON
//! output. They carry no I/O handles.

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SlotError;

/// Result of asking the runtime whether a slot's container is up.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunningState {
    Running,
    NotRunning,
    /// The runtime could not be queried.
    Unknown,
}

/// Resolved lifecycle status of one slot index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotStatus {
    /// Directory present, container not running.
    Allocated,
    /// Covered by the counter but the directory is gone.
    Dead,
    /// A container for this slot is running.
    Running,
    /// Directory present, running state could not be determined.
    Unknown,
}

impl fmt::Display for SlotStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SlotStatus::Allocated => "allocated",
            SlotStatus::Dead => "dead",
            SlotStatus::Running => "running",
            SlotStatus::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// A slot handed to the caller by allocate / select-for-run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotHandle {
    pub index: u32,
    pub checksum: String,
    pub directory: PathBuf,
    pub container_name: String,
}

/// One row of a slot listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRecord {
    pub index: u32,
    pub checksum: String,
    pub directory: PathBuf,
    pub directory_exists: bool,
    pub credential_present: bool,
    pub running: RunningState,
    pub status: SlotStatus,
}

/// Which slot(s) a revoke applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RevokeTarget {
    Highest,
    All,
    Index(u32),
}

impl FromStr for RevokeTarget {
    type Err = SlotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "highest" => Ok(RevokeTarget::Highest),
            "all" => Ok(RevokeTarget::All),
            other => match other.parse::<u32>() {
                Ok(0) => Err(SlotError::InvalidInput(
                    "slot index 0 is the project itself, not a slot".to_string(),
                )),
                Ok(n) => Ok(RevokeTarget::Index(n)),
                Err(_) => Err(SlotError::InvalidInput(format!(
                    "slot must be 'highest', 'all', or an index >= 1 (got '{other}')"
                ))),
            },
        }
    }
}

/// Why a revoke left a slot in place.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind", content = "detail")]
pub enum SkipReason {
    /// Its container is running.
    Running,
    /// The runtime could not be probed; treated as in use.
    ProbeFailed(String),
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Running => f.write_str("slot currently in use"),
            SkipReason::ProbeFailed(err) => write!(f, "running state unknown ({err})"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedSlot {
    pub index: u32,
    pub checksum: String,
    pub reason: SkipReason,
}

/// Summary of a revoke operation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RevokeOutcome {
    /// Indices whose directories were removed, in removal order.
    pub removed: Vec<u32>,
    /// Slots left in place, in scan order.
    pub skipped: Vec<SkippedSlot>,
    /// Counter value after the operation.
    pub counter: u32,
}
