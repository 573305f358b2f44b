//! Prune job: drop fingerprint records whose file is gone or no longer in scope.

use anyhow::{Context, Result};
use rayon::prelude::*;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;

use crate::catalog::LibraryCatalog;
use crate::classify::{PathClassifier, validate_path};
use crate::engine::db_ops::{FingerprintStore, Namespace};
use crate::error::ScanError;
use crate::pipeline::guard::{FlightPermit, SingleFlight};
use crate::types::{Library, LibraryId, PruneReport};

pub struct PruneJob {
    catalog: Arc<dyn LibraryCatalog>,
    classifier: Arc<PathClassifier>,
    store: Arc<FingerprintStore>,
    metadata_namespaces: Vec<Namespace>,
    guard: SingleFlight,
}

impl PruneJob {
    pub fn new(
        catalog: Arc<dyn LibraryCatalog>,
        classifier: Arc<PathClassifier>,
        store: Arc<FingerprintStore>,
    ) -> Self {
        Self {
            catalog,
            classifier,
            store,
            metadata_namespaces: Vec::new(),
            guard: SingleFlight::new("prune"),
        }
    }

    /// Provider namespaces to clean of records whose file no longer exists (full prunes only).
    pub fn with_metadata_namespaces(mut self, namespaces: Vec<Namespace>) -> Self {
        self.metadata_namespaces = namespaces;
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_busy()
    }

    /// Prune `library_id`, or every local library when `None`, on the calling thread.
    /// `Ok(None)` when another prune is in flight.
    pub fn run(&self, library_id: Option<LibraryId>) -> Result<Option<PruneReport>> {
        let libraries = self.in_scope(library_id)?;
        let Some(permit) = self.acquire() else {
            return Ok(None);
        };
        self.execute(&libraries, library_id.is_none(), permit).map(Some)
    }

    /// Fire-and-forget variant of [`Self::run`]. Returns whether the job was started.
    pub fn spawn(self: &Arc<Self>, library_id: Option<LibraryId>) -> Result<bool> {
        let libraries = self.in_scope(library_id)?;
        let Some(permit) = self.acquire() else {
            return Ok(false);
        };
        let job = Arc::clone(self);
        thread::Builder::new()
            .name("incscan-prune".to_string())
            .spawn(move || {
                if let Err(err) = job.execute(&libraries, library_id.is_none(), permit) {
                    log::error!("Prune failed: {:#}", err);
                }
            })
            .context("spawn prune job")?;
        Ok(true)
    }

    fn acquire(&self) -> Option<FlightPermit> {
        let permit = self.guard.try_acquire();
        if permit.is_none() {
            log::info!("Rejected prune request: a prune is already running");
        }
        permit
    }

    fn in_scope(&self, library_id: Option<LibraryId>) -> Result<Vec<Library>> {
        match library_id {
            None => Ok(self.catalog.local_libraries()),
            Some(id) => {
                let library = self
                    .catalog
                    .library(id)
                    .ok_or(ScanError::UnknownLibrary(id))?;
                if library.remote_only {
                    return Err(ScanError::RemoteOnlyLibrary(id).into());
                }
                Ok(vec![library])
            }
        }
    }

    fn execute(
        &self,
        libraries: &[Library],
        include_metadata: bool,
        _permit: FlightPermit,
    ) -> Result<PruneReport> {
        let mut report = PruneReport::default();
        for library in libraries {
            log::info!("Pruning timestamps of library {} ({})", library.id, library.name);
            report.timestamps_pruned += self.prune_library(library)?;
        }
        if include_metadata {
            for ns in &self.metadata_namespaces {
                report.metadata_pruned += self.prune_orphans(ns)?;
            }
        }
        log::info!(
            "Pruned {} record(s): {} timestamp(s), {} metadata",
            report.total(),
            report.timestamps_pruned,
            report.metadata_pruned
        );
        Ok(report)
    }

    fn prune_library(&self, library: &Library) -> Result<usize> {
        let ns = Namespace::timestamps(library.id);
        let session = self.store.session()?;
        let keys = session.all_keys(&ns)?;
        let stale: Vec<PathBuf> = keys
            .into_par_iter()
            .filter(|path| {
                !path.exists()
                    || !validate_path(path, &library.path)
                    || !self.classifier.is_allowed(library.id, path)
            })
            .collect();
        let removed = session.remove(&ns, &stale)?;
        log::debug!("library {}: removed {} stale record(s)", library.id, removed);
        Ok(removed)
    }

    fn prune_orphans(&self, ns: &Namespace) -> Result<usize> {
        let session = self.store.session()?;
        let gone: Vec<PathBuf> = session
            .all_keys(ns)?
            .into_par_iter()
            .filter(|path| !path.exists())
            .collect();
        let removed = session.remove(ns, &gone)?;
        log::debug!("{}: removed {} orphaned record(s)", ns, removed);
        Ok(removed)
    }
}
