//! Agent-driven migration of Enzyme tests to React Testing Library.
//!
//! An LLM agent rewrites one test file at a time through a small, budgeted set
//! of capabilities. Every submission is executed with the project's test
//! runner and the loop stops on success, stagnation, or a hard ceiling.
//!
//! - **[`core`]**: Pure, deterministic logic (capabilities, budgets,
//!   convergence, output classification). No I/O.
//! - **[`io`]**: Side-effecting collaborators (agent HTTP client, processes,
//!   filesystem). Isolated behind traits so runs can be scripted in tests.
//!
//! [`orchestrator`], [`handlers`], and [`batch`] coordinate the two to
//! implement the CLI commands.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod handlers;
pub mod io;
pub mod logging;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
