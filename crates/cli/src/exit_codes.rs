//! CLI Exit Code Registry
//!
//! This is the single source of truth for all CLI exit codes.
//! Exit codes are part of the shell contract; scripts rely on them.
//!
//! | Code | Description                                          |
//! |------|------------------------------------------------------|
//! | 0    | Success                                              |
//! | 1    | General error (unspecified)                          |
//! | 2    | CLI usage error (bad args, bad settings, would overwrite) |
//! | 3    | I/O error reading the template or writing the report |
//! | 4    | Render data is not valid JSON or does not fit a range |
//! | 5    | Template structure or cell syntax error              |

use xlst_engine::TemplateError;

/// Success - command completed without errors.
pub const EXIT_SUCCESS: u8 = 0;

/// General error - unspecified failure.
/// Avoid using this; prefer a specific error code.
pub const EXIT_ERROR: u8 = 1;

/// Usage error - bad arguments, unreadable settings, existing output.
pub const EXIT_USAGE: u8 = 2;

/// Template could not be read or the report could not be written.
pub const EXIT_IO: u8 = 3;

/// Context data rejected: malformed JSON, or a range bound to something
/// other than a list of objects.
pub const EXIT_CONTEXT: u8 = 4;

/// Unclosed range, stray end, or a cell the template engine cannot
/// parse or execute.
pub const EXIT_TEMPLATE: u8 = 5;

/// Map a render error to its exit code.
pub fn template_exit_code(err: &TemplateError) -> u8 {
    match err {
        TemplateError::Io(_) => EXIT_IO,
        TemplateError::RangeContext { .. } => EXIT_CONTEXT,
        e if e.is_template_fault() => EXIT_TEMPLATE,
        _ => EXIT_ERROR,
    }
}
