//! Stable exit codes for podslot CLI commands.

/// Command succeeded (for `cache check`: image is up to date).
pub const OK: i32 = 0;
/// Command failed: invalid input, runtime unavailable, corrupt state, I/O.
pub const INVALID: i32 = 1;
/// `podslot select` found no free slot (none exist, or all are busy).
pub const NOT_FOUND: i32 = 2;
/// `podslot revoke` left at least one slot in place because it is in use.
pub const IN_USE: i32 = 3;
/// `podslot cache check` found changed layers.
pub const REBUILD: i32 = 4;
