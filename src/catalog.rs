//! Read-only views of host-owned library state.

use crate::types::{Library, LibraryConfig, LibraryId};

/// Libraries known to the host orchestrator.
pub trait LibraryCatalog: Send + Sync {
    /// Every library, remote-only ones included.
    fn all_libraries(&self) -> Vec<Library>;

    fn library(&self, id: LibraryId) -> Option<Library> {
        self.all_libraries().into_iter().find(|l| l.id == id)
    }

    /// Libraries eligible for local scanning (remote-only excluded).
    fn local_libraries(&self) -> Vec<Library> {
        self.all_libraries()
            .into_iter()
            .filter(|l| !l.remote_only)
            .collect()
    }
}

/// Typed per-library configuration lookup. Defaults are applied by the implementor.
pub trait LibraryConfigSource: Send + Sync {
    fn library_config(&self, id: LibraryId) -> LibraryConfig;
}
