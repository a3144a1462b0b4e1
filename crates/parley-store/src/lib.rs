//! # parley-store
//!
//! In-memory reference implementations of the Parley collaborator
//! contracts: conversation storage, the user directory, and opaque-token
//! authentication. The dev-mode server binary runs on these; tests use
//! them as the canonical contract fixtures.
//!
//! A production deployment replaces this crate with adapters over a real
//! storage engine; the contracts in `parley-core` are the boundary.

pub mod memory;

pub use memory::{MemoryDirectory, MemoryStore};
