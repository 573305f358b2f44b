//! Incscan: incremental media library rescanning with persisted mtime fingerprints

pub mod analyzer;
pub mod api;
pub mod catalog;
pub mod classify;
pub mod engine;
pub mod error;
pub mod pipeline;
pub mod prune;
pub mod timestamps;
pub mod tree;
pub mod types;
pub mod utils;

/// Re-export types for API
pub use types::*;

pub use analyzer::{
    Analyzer, AnalyzerChain, CommandProvider, FileTester, FnAnalyzer, MetadataCacheAnalyzer,
    MetadataProvider, TimestampAnalyzer,
};
pub use api::Api;
pub use catalog::{LibraryCatalog, LibraryConfigSource};
pub use classify::{FileKind, PathClassifier, validate_path};
pub use engine::db_ops::{FingerprintRecord, FingerprintStore, Namespace, StoreSession};
pub use error::ScanError;
pub use pipeline::{BatchStatus, ChannelTaskQueue, ScanPipeline, ScanRunHandle, TaskQueue};
pub use prune::PruneJob;
pub use timestamps::TimestampKeeper;
pub use tree::{TreeLoader, TreeNode};
pub use utils::settings::Settings;

/// Result alias used by public incscan API
pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, Error>;
