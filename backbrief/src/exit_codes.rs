//! Stable exit codes for backbrief CLI commands.

/// Command succeeded or the session completed.
pub const OK: i32 = 0;
/// Command failed due to invalid layout/config or other errors.
pub const INVALID: i32 = 1;
/// The operator quit at startup or aborted a phase.
pub const ABORTED: i32 = 2;
