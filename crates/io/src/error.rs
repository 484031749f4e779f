use std::fmt;
use std::io;
use std::path::{Path, PathBuf};

use iprtrack_recon::ReconError;

#[derive(Debug)]
pub enum StoreError {
    /// Filesystem failure on a specific path.
    Io { path: PathBuf, source: io::Error },
    /// The registry workbook could not be opened or read.
    Open { path: PathBuf, message: String },
    /// The registry workbook could not be written.
    Write { path: PathBuf, message: String },
    /// A data row is unusable: 1-based spreadsheet row number and the
    /// offending cell's column, e.g. `A (№)`.
    Row { row: usize, column: &'static str, message: String },
    /// Rows parsed but violate registry invariants.
    Registry(ReconError),
    /// Another process holds the registry lock.
    Locked { path: PathBuf },
    /// Observation or export CSV failure.
    Csv { path: PathBuf, message: String },
}

impl StoreError {
    pub(crate) fn io(path: &Path, source: io::Error) -> Self {
        Self::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn row(row: usize, column: &'static str, message: impl Into<String>) -> Self {
        Self::Row {
            row,
            column,
            message: message.into(),
        }
    }
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, source } => write!(f, "{}: {source}", path.display()),
            Self::Open { path, message } => {
                write!(f, "cannot read registry {}: {message}", path.display())
            }
            Self::Write { path, message } => {
                write!(f, "cannot write registry {}: {message}", path.display())
            }
            Self::Row { row, column, message } => write!(f, "row {row}, column {column}: {message}"),
            Self::Registry(e) => write!(f, "{e}"),
            Self::Locked { path } => write!(f, "registry is locked ({} exists)", path.display()),
            Self::Csv { path, message } => write!(f, "{}: {message}", path.display()),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => Some(source),
            Self::Registry(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ReconError> for StoreError {
    fn from(e: ReconError) -> Self {
        Self::Registry(e)
    }
}
