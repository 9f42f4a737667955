use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AkgError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("data directory {0} must exist")]
    MissingInputDir(PathBuf),

    #[error("tracking file {0} does not exist (run `akg scan` first)")]
    LedgerMissing(PathBuf),

    #[error("tracking file {path} is corrupt: {message}")]
    LedgerCorrupt { path: PathBuf, message: String },

    #[error("tracking file {0} is locked or read-only")]
    #[diagnostic(help(
        "close the tracking file in any other program (spreadsheet, editor) and rerun"
    ))]
    LedgerWriteConflict(PathBuf),

    #[error("failed to read {path}: {message}")]
    FileRead { path: PathBuf, message: String },

    #[error("no {role} column found in {path}")]
    NoRelevantColumn { path: PathBuf, role: String },

    #[error("row {line} has {found} fields, {expected} needed")]
    MalformedRow {
        line: usize,
        expected: usize,
        found: usize,
    },

    #[error("column '{column}' in {path} mixes numeric and text values")]
    MixedTypes { path: PathBuf, column: String },

    #[error("gene reference table error: {0}")]
    ReferenceTable(String),

    #[error("uuid map error: {0}")]
    UuidMap(String),

    #[error("tracking entry not found: {0}")]
    EntryNotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl AkgError {
    /// Per-file content problems that a stage logs and skips instead of aborting the run.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            AkgError::FileRead { .. }
                | AkgError::NoRelevantColumn { .. }
                | AkgError::MalformedRow { .. }
                | AkgError::MixedTypes { .. }
        )
    }
}
