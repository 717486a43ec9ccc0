//! Error types for transcript parsing and path resolution.

use std::path::PathBuf;

/// Errors surfaced by [`crate::parser`] and [`crate::paths`].
///
/// Malformed individual JSONL *lines* are never represented here — per the
/// parser's contract they are logged at DEBUG and skipped, not propagated.
/// This type covers failures that abort parsing a whole file or directory.
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("failed to read transcript file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("transcript path has no file stem: {0}")]
    MissingFileStem(PathBuf),

    #[error("project directory name is not a valid encoded path: {0}")]
    InvalidProjectDir(String),
}
