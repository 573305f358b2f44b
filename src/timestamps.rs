//! Explicit timestamp maintenance: reset, refresh, and recording after downstream processing.
//!
//! All writes go through the per-library timestamp namespace of the fingerprint store.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;

use crate::catalog::LibraryCatalog;
use crate::classify::PathClassifier;
use crate::engine::db_ops::{FingerprintStore, Namespace};
use crate::engine::tools::file_mtime;
use crate::pipeline::batch::resolve_batch;
use crate::types::{BatchItem, LibraryId};

/// Token written by a reset. Real mtimes are positive, so the next scan sees a change.
pub const RESET_TOKEN: i64 = 0;

pub struct TimestampKeeper {
    catalog: Arc<dyn LibraryCatalog>,
    classifier: Arc<PathClassifier>,
    store: Arc<FingerprintStore>,
}

impl TimestampKeeper {
    pub fn new(
        catalog: Arc<dyn LibraryCatalog>,
        classifier: Arc<PathClassifier>,
        store: Arc<FingerprintStore>,
    ) -> Self {
        Self {
            catalog,
            classifier,
            store,
        }
    }

    /// Force every allowed file of the batch to read as changed on its next scan.
    pub fn reset_timestamps(&self, items: &[BatchItem]) -> Result<usize> {
        let expanded = resolve_batch(self.catalog.as_ref(), &self.classifier, items)?;
        let mut session = self.store.session()?;
        let mut written = 0;
        for (library_id, files) in expanded {
            let values: Vec<(PathBuf, i64)> =
                files.into_keys().map(|p| (p, RESET_TOKEN)).collect();
            session.put_many(&Namespace::timestamps(library_id), &values)?;
            written += values.len();
        }
        log::info!("Reset {} timestamp(s)", written);
        Ok(written)
    }

    /// Record the current mtime of every allowed file of the batch, marking it up to date.
    /// Files that cannot be stat'ed are logged and skipped.
    pub fn update_timestamps(&self, items: &[BatchItem]) -> Result<usize> {
        let expanded = resolve_batch(self.catalog.as_ref(), &self.classifier, items)?;
        let mut written = 0;
        for (library_id, files) in expanded {
            written += self.record(library_id, files.into_keys())?;
        }
        log::info!("Updated {} timestamp(s)", written);
        Ok(written)
    }

    /// Hook for the host after a downstream task succeeded: the files it produced are current.
    pub fn record_processed(&self, library_id: LibraryId, destination_files: &[PathBuf]) -> Result<usize> {
        let written = self.record(library_id, destination_files.iter().cloned())?;
        log::debug!(
            "Recorded {} processed file(s) for library {}",
            written,
            library_id
        );
        Ok(written)
    }

    fn record<I>(&self, library_id: LibraryId, files: I) -> Result<usize>
    where
        I: IntoIterator<Item = PathBuf>,
    {
        let mut values = Vec::new();
        for path in files {
            match file_mtime(&path) {
                Ok(mtime) => values.push((path, mtime)),
                Err(err) => log::warn!("Skipping timestamp update: {}", err),
            }
        }
        let mut session = self.store.session()?;
        session.put_many(&Namespace::timestamps(library_id), &values)?;
        Ok(values.len())
    }
}
