//! Stable exit codes for `recon` commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid steering, unknown module, path assembly or conditions failure.
pub const INVALID: i32 = 1;
/// The run started but a module failed during initialize or event processing.
pub const ABORTED: i32 = 2;
