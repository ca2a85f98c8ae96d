//! Stable exit codes for searcher CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// The search ran but produced a failure response.
pub const FAILED: i32 = 1;
/// Invalid invocation, request, or configuration.
pub const INVALID: i32 = 2;
