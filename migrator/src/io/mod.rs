//! I/O collaborators for migration runs.

pub mod agent;
pub mod attempt_log;
pub mod config;
pub mod discovery;
pub mod imports;
pub mod locator;
pub mod process;
pub mod prompt;
pub mod references;
pub mod validation;
