//! Typed failures that callers may want to tell apart. Carried inside `anyhow::Error`.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::LibraryId;

#[derive(Debug, Error)]
pub enum ScanError {
    /// Path is relative, contains a `..` segment, or lies outside its library root.
    #[error("Invalid path: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Unknown library: {0}")]
    UnknownLibrary(LibraryId),

    #[error("Library is remote only: {0}")]
    RemoteOnlyLibrary(LibraryId),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Analyzer failed for {path}: {message}")]
    Analyzer { path: PathBuf, message: String },

    /// Namespaces become table names, so only `[A-Za-z0-9_]` is accepted.
    #[error("Invalid namespace: {0:?}")]
    InvalidNamespace(String),
}

impl ScanError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        ScanError::Io {
            path: path.into(),
            source,
        }
    }
}
