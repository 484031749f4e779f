//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scheduled runs rely on them.
//!
//! # Exit Code Ranges
//!
//! | Range   | Domain           | Description                              |
//! |---------|------------------|------------------------------------------|
//! | 0       | Universal        | Success                                  |
//! | 1       | Universal        | General error (unspecified)              |
//! | 2       | Universal        | CLI usage error (bad args, missing file) |
//! | 3-9     | registry         | Registry store, lock, configuration      |
//! | 50-59   | fetch            | Remote lookups and publication           |
//!
//! # Adding New Exit Codes
//!
//! 1. Add the constant in the appropriate range
//! 2. Document what triggers it
//! 3. Update the table above
//! 4. Wire it into the relevant `From` impl in `error.rs`

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing input file.
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Registry (3-9)
// =============================================================================

/// Filesystem failure reading or writing the registry, a backup, or an export.
pub const EXIT_IO: u8 = 3;

/// Registry or observation file is unusable (bad tax id, duplicate key,
/// not a workbook).
pub const EXIT_PARSE: u8 = 4;

/// Another run holds the registry lock.
pub const EXIT_LOCKED: u8 = 5;

/// Configuration file missing, malformed, or invalid.
pub const EXIT_CONFIG: u8 = 6;

// =============================================================================
// Fetch (50-59): company lookup, folder store, sheets
// =============================================================================

/// No token provided (neither flag nor env var).
pub const EXIT_FETCH_NOT_AUTH: u8 = 50;

/// Auth rejected by upstream (401/403).
pub const EXIT_FETCH_AUTH: u8 = 51;

/// Bad request rejected by upstream (400).
pub const EXIT_FETCH_VALIDATION: u8 = 52;

/// Rate limited after retries (429).
pub const EXIT_FETCH_RATE_LIMIT: u8 = 53;

/// Upstream error (5xx), undecodable body, or network failure.
pub const EXIT_FETCH_UPSTREAM: u8 = 54;

/// A status or freshness pass kept failing until the batch retry gave up.
pub const EXIT_FETCH_GAVE_UP: u8 = 55;
