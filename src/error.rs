/*!
 * Error types for dualrail
 *
 * Only a handful of operations can fail from the caller's point of view:
 * reading a log or debug file back, enabling an inspector, and loading
 * configuration in strict mode. Writing entries never returns an error.
 */

use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Exit code constants for the CLI
pub const EXIT_SUCCESS: i32 = 0;
/// A file was read only up to a malformed entry
pub const EXIT_PARTIAL: i32 = 1;
pub const EXIT_FATAL: i32 = 2;

#[derive(Debug, Error)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// JSON (or JSONC) error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Log or debug file could not be read back
    #[error(transparent)]
    Parse(#[from] ParseError),
}

/// Why reading a log or debug file stopped
///
/// Readers return this alongside every entry decoded before the failure;
/// see [`crate::parser::ParsedFile`].
#[derive(Debug, Error)]
pub enum ParseError {
    /// The file could not be opened or read
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Text at `line` (1-based) does not follow the entry format
    #[error("malformed entry at line {line}: {reason}")]
    Malformed { line: usize, reason: String },
}

impl ParseError {
    pub fn malformed(line: usize, reason: impl Into<String>) -> Self {
        ParseError::Malformed {
            line,
            reason: reason.into(),
        }
    }

    /// Line where parsing stopped, if the file was readable at all
    pub fn line(&self) -> Option<usize> {
        match self {
            ParseError::Io { .. } => None,
            ParseError::Malformed { line, .. } => Some(*line),
        }
    }
}
