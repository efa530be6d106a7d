//! Stable exit codes for survey CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, unknown street, missing API key, or any other fatal error.
pub const INVALID: i32 = 1;
/// A street's stored results could not be read back.
pub const STORE_CORRUPT: i32 = 2;
