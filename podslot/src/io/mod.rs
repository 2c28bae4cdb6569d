//! I/O adapters: filesystem state, locking, and the container runtime.

pub mod atomic;
pub mod config;
pub mod counter;
pub mod lock;
pub mod paths;
pub mod process;
pub mod project_meta;
pub mod runtime;
pub mod snapshot_store;
