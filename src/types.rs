//! Public and internal types shared by the store, pipeline and API.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// Numeric library id, owned by the host orchestrator.
pub type LibraryId = i64;

/// A media library as seen by the scanner. Remote-only libraries are never scanned locally.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    pub path: PathBuf,
    pub remote_only: bool,
}

/// Per-library settings with defaults already applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LibraryConfig {
    /// Lowercase extensions without the leading dot.
    pub allowed_extensions: Vec<String>,
    /// Names of the metadata providers run for this library.
    pub enabled_providers: Vec<String>,
    /// Log metadata cache hits and misses at debug instead of info.
    pub quiet_caching: bool,
}

impl LibraryConfig {
    pub fn provider_enabled(&self, name: &str) -> bool {
        self.enabled_providers.iter().any(|p| p == name)
    }
}

/// Metadata gathered while testing a file, keyed by provider name.
pub type SharedInfo = BTreeMap<String, Value>;

/// Transient unit of work: one file of one library, with an optional downstream priority.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanItem {
    pub library_id: LibraryId,
    pub path: PathBuf,
    #[serde(default)]
    pub priority_score: Option<i64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub shared_info: SharedInfo,
}

/// Outcome of testing one file against the analyzer contract.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Verdict {
    /// File unchanged since it was last examined; drop it.
    Skip,
    /// File is new or changed; forward it downstream with whatever metadata the testers produced.
    Forward {
        priority_score: Option<i64>,
        shared_info: SharedInfo,
    },
}

impl Verdict {
    pub fn forward() -> Self {
        Verdict::Forward {
            priority_score: None,
            shared_info: SharedInfo::new(),
        }
    }

    pub fn with_priority(score: i64) -> Self {
        Verdict::Forward {
            priority_score: Some(score),
            shared_info: SharedInfo::new(),
        }
    }

    pub fn is_skip(&self) -> bool {
        matches!(self, Verdict::Skip)
    }
}

/// One element of an API batch: a file or directory inside a library.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub library_id: LibraryId,
    pub path: PathBuf,
    #[serde(default)]
    pub priority_score: Option<i64>,
}

/// Request body accepted by every batch operation: either `{"arr": [...]}` or a bare item.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
pub enum Batch<T> {
    Many { arr: Vec<T> },
    One(T),
}

impl<T> Batch<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Batch::Many { arr } => arr,
            Batch::One(item) => vec![item],
        }
    }
}

impl<T> From<Vec<T>> for Batch<T> {
    fn from(arr: Vec<T>) -> Self {
        Batch::Many { arr }
    }
}

/// Counts reported by a finished scan run of one library.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub library_id: LibraryId,
    pub total: usize,
    pub tested: usize,
    pub forwarded: usize,
    pub failed: usize,
    pub cancelled: bool,
}

/// Counts reported by a prune run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct PruneReport {
    pub timestamps_pruned: usize,
    pub metadata_pruned: usize,
}

impl PruneReport {
    pub fn total(&self) -> usize {
        self.timestamps_pruned + self.metadata_pruned
    }
}
