//! Batch intake: fail-closed validation, then expansion into allowed files grouped by library.

use anyhow::Result;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::catalog::LibraryCatalog;
use crate::classify::{PathClassifier, check_path};
use crate::engine::tools::expand_path;
use crate::error::ScanError;
use crate::types::{BatchItem, LibraryId};

/// Allowed files per library, each with the highest priority any batch item gave it.
pub type ExpandedBatch = BTreeMap<LibraryId, BTreeMap<PathBuf, Option<i64>>>;

/// Check every item before anything runs. The first bad item rejects the whole batch.
pub fn validate_batch(catalog: &dyn LibraryCatalog, items: &[BatchItem]) -> Result<(), ScanError> {
    for item in items {
        let library = catalog
            .library(item.library_id)
            .ok_or(ScanError::UnknownLibrary(item.library_id))?;
        if library.remote_only {
            return Err(ScanError::RemoteOnlyLibrary(item.library_id));
        }
        check_path(&item.path, &library)?;
    }
    Ok(())
}

/// Expand directories recursively and keep only files the classifier allows. Duplicates collapse.
pub fn expand_batch(classifier: &PathClassifier, items: &[BatchItem]) -> ExpandedBatch {
    let mut grouped = ExpandedBatch::new();
    for item in items {
        for file in expand_path(&item.path) {
            if !classifier.is_allowed(item.library_id, &file) {
                continue;
            }
            let slot = grouped
                .entry(item.library_id)
                .or_default()
                .entry(file)
                .or_insert(item.priority_score);
            *slot = (*slot).max(item.priority_score);
        }
    }
    grouped
}

/// [`validate_batch`] then [`expand_batch`].
pub fn resolve_batch(
    catalog: &dyn LibraryCatalog,
    classifier: &PathClassifier,
    items: &[BatchItem],
) -> Result<ExpandedBatch> {
    validate_batch(catalog, items)?;
    Ok(expand_batch(classifier, items))
}
