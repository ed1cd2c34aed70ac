//! Concrete environments implementing the `poolforge-core` chain seams.
//!
//! Currently ships the in-memory chain used by integration tests and local
//! experimentation.

pub mod memory;

pub use memory::InMemoryChain;
