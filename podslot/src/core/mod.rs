//! Deterministic, pure logic shared by the slot store and build-cache gate.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data and return deterministic outputs suitable for tests.

pub mod checksum;
pub mod identity;
pub mod layers;
pub mod status;
pub mod types;
