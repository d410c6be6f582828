//! Deterministic, pure logic shared by the migrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod capability;
pub mod classifier;
pub mod convergence;
pub mod guidance;
pub mod path;
pub mod run_state;
pub mod types;
