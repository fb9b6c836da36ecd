//! Human-in-the-loop orchestrator for a coding agent.
//!
//! A session moves through planning (backbrief, plan, adversarial
//! cross-check, operator approval), execution (one fresh agent process per
//! task) and a final review. Every step runs the agent as an independent
//! subprocess; all continuity lives in files under `.backbrief/session/`.
//!
//! - **[`core`]**: Pure, deterministic logic (phase rules, task extraction,
//!   reputation ranking). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (filesystem, stores, process
//!   execution, operator prompts). Isolated behind traits for tests.
//!
//! Orchestration modules ([`start`], [`planning`], [`execution`], [`review`],
//! [`session`], [`validate`]) coordinate core logic with I/O to implement CLI
//! commands.

pub mod core;
pub mod execution;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod planning;
pub mod review;
pub mod session;
pub mod start;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod validate;
