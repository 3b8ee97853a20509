//! Error types for catalog loading, writing and whole-run orchestration.

use std::path::PathBuf;

use thiserror::Error;

/// Failure while reading one source file into a [`Table`](crate::table::Table).
#[derive(Error, Debug)]
pub enum LoadError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("spreadsheet error: {0}")]
    Spreadsheet(#[from] calamine::Error),

    #[error("unsupported input format '{0}'")]
    UnsupportedFormat(String),

    #[error("workbook has no worksheet")]
    NoSheet,

    #[error("file has no header row")]
    NoHeader,
}

/// Failure while writing the merged output table.
#[derive(Error, Debug)]
pub enum WriteError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV writing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("XLSX writing error: {0}")]
    Xlsx(#[from] rust_xlsxwriter::XlsxError),

    #[error("unsupported output format '{0}'")]
    UnsupportedFormat(String),

    #[error("could not move finished output into place: {0}")]
    Persist(#[from] tempfile::PersistError),
}

/// Failure while reading run or vocabulary configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("cannot read {}: {cause}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        cause: std::io::Error,
    },

    #[error("invalid JSON in {}: {cause}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        cause: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Coarse failure classes reported to the host.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailureKind {
    Load,
    EmptyResult,
    Write,
    Cancelled,
    Unexpected,
}

/// Terminal failure of a run. Every variant is fatal; nothing is written on failure.
#[derive(Error, Debug)]
pub enum RunError {
    #[error("failed to load source '{source_key}' from {}: {cause}", path.display())]
    Load {
        source_key: String,
        path: PathBuf,
        #[source]
        cause: LoadError,
    },

    #[error("no data matched filters")]
    EmptyResult,

    #[error("failed to write output {}: {cause}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        cause: WriteError,
    },

    #[error("run cancelled")]
    Cancelled,

    #[error("unexpected failure: {message}")]
    Unexpected { message: String, trace: String },
}

impl RunError {
    pub fn kind(&self) -> FailureKind {
        match self {
            RunError::Load { .. } => FailureKind::Load,
            RunError::EmptyResult => FailureKind::EmptyResult,
            RunError::Write { .. } => FailureKind::Write,
            RunError::Cancelled => FailureKind::Cancelled,
            RunError::Unexpected { .. } => FailureKind::Unexpected,
        }
    }

    /// Diagnostic trace captured for unexpected failures.
    pub fn trace(&self) -> Option<&str> {
        match self {
            RunError::Unexpected { trace, .. } => Some(trace),
            _ => None,
        }
    }
}

/// Result type alias for run-level operations.
pub type Result<T> = std::result::Result<T, RunError>;
