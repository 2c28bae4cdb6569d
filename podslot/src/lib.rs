//! Reusable, per-project container slots and build-cache invalidation.
//!
//! A project directory owns a chain of slot identities derived from its path.
//! Each slot is a directory of persistent state plus a container name; slots
//! are allocated, reused, pruned and revoked against a persisted counter. A
//! separate gate decides whether the project's image must be rebuilt.
//!
//! - **[`core`]**: Pure, deterministic logic (checksums, identities, layer
//!   snapshots, status resolution). No I/O.
//! - **[`io`]**: Side-effecting adapters (state files, locking, container
//!   runtime queries, config).
//!
//! [`store`] and [`cache`] coordinate the two to implement the operations
//! the CLI exposes.

pub mod cache;
pub mod core;
pub mod error;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod store;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
