//! CLI Exit Code Registry
//!
//! This is the single source of truth for all `tally` exit codes.
//! Exit codes are part of the shell contract: scripts rely on them.
//!
//! | Code | Meaning                                                  |
//! |------|----------------------------------------------------------|
//! | 0    | Success                                                  |
//! | 1    | General error (unspecified)                              |
//! | 2    | CLI usage error (bad args)                               |
//! | 60   | Config failed to parse or validate                       |
//! | 61   | Runtime error (unreadable input, failed write)           |
//! | 62   | Unmatched listings found under `--fail-on-unmatched`     |

// =============================================================================
// Universal (0-2)
// =============================================================================

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
#[allow(dead_code)]
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, missing required options.
/// clap exits with this code itself on parse failure.
#[allow(dead_code)]
pub const EXIT_USAGE: u8 = 2;

// =============================================================================
// Recon (60-69)
// =============================================================================

/// Config file failed TOML parsing or validation.
pub const EXIT_RECON_INVALID_CONFIG: u8 = 60;

/// Input could not be read or decoded, or an output could not be written.
pub const EXIT_RECON_RUNTIME: u8 = 61;

/// At least one listing with a transaction id found no order aggregate
/// (only with `--fail-on-unmatched`).
pub const EXIT_RECON_UNMATCHED: u8 = 62;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_distinct() {
        let codes = [
            EXIT_SUCCESS,
            EXIT_ERROR,
            EXIT_USAGE,
            EXIT_RECON_INVALID_CONFIG,
            EXIT_RECON_RUNTIME,
            EXIT_RECON_UNMATCHED,
        ];
        let mut sorted = codes.to_vec();
        sorted.sort_unstable();
        sorted.dedup();
        assert_eq!(sorted.len(), codes.len());
    }
}
