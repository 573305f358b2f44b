//! Path classification: per-library extension allow-lists, containment checks, presentation hints.

use serde::{Serialize, Serializer};
use std::collections::HashMap;
use std::path::{Component, Path};
use std::sync::{Arc, PoisonError, RwLock};

use crate::catalog::LibraryConfigSource;
use crate::engine::tools::extension_lower;
use crate::error::ScanError;
use crate::types::{Library, LibraryId};

/// Resolves allow-lists lazily, once per library, and keeps them until [`PathClassifier::invalidate`].
pub struct PathClassifier {
    source: Arc<dyn LibraryConfigSource>,
    allowed: RwLock<HashMap<LibraryId, Arc<[String]>>>,
}

impl PathClassifier {
    pub fn new(source: Arc<dyn LibraryConfigSource>) -> Self {
        Self {
            source,
            allowed: RwLock::new(HashMap::new()),
        }
    }

    /// Allow-list of a library. Racing first lookups resolve the same list, so either write wins.
    pub fn allowed_extensions(&self, library_id: LibraryId) -> Arc<[String]> {
        if let Some(list) = self
            .allowed
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&library_id)
        {
            return Arc::clone(list);
        }
        let list: Arc<[String]> = self
            .source
            .library_config(library_id)
            .allowed_extensions
            .into();
        self.allowed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(library_id)
            .or_insert(list)
            .clone()
    }

    /// True iff the lowercase extension of `path` is in the library's allow-list.
    pub fn is_allowed(&self, library_id: LibraryId, path: &Path) -> bool {
        match extension_lower(path) {
            Some(ext) => self
                .allowed_extensions(library_id)
                .iter()
                .any(|a| *a == ext),
            None => false,
        }
    }

    /// Drop every cached allow-list (configuration reload).
    pub fn invalidate(&self) {
        self.allowed
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

/// True iff `path` is absolute, has no `..` segment, and lies under `library_root`.
pub fn validate_path(path: &Path, library_root: &Path) -> bool {
    path.is_absolute()
        && !path.components().any(|c| matches!(c, Component::ParentDir))
        && path.starts_with(library_root)
}

/// [`validate_path`] against a library, as an error for fail-closed batch handling.
pub fn check_path(path: &Path, library: &Library) -> Result<(), ScanError> {
    if validate_path(path, &library.path) {
        Ok(())
    } else {
        Err(ScanError::InvalidPath {
            path: path.to_path_buf(),
        })
    }
}

/// Presentation category of a file, derived from its extension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FileKind {
    Video,
    Audio,
    Image,
    Generic,
}

impl FileKind {
    pub fn from_path(path: &Path) -> Self {
        match extension_lower(path).as_deref() {
            Some("mp4" | "mkv" | "webm" | "avi" | "mov" | "flv") => FileKind::Video,
            Some("mp3" | "m4a" | "flac" | "opus" | "ogg") => FileKind::Audio,
            Some("jpg" | "png" | "bmp") => FileKind::Image,
            _ => FileKind::Generic,
        }
    }

    /// Icon class used by the panel front end.
    pub fn icon(&self) -> &'static str {
        match self {
            FileKind::Video => "bi bi-film",
            FileKind::Audio => "bi bi-music-note-beamed",
            FileKind::Image => "bi bi-image",
            FileKind::Generic => "bi bi-file-earmark",
        }
    }
}

impl Serialize for FileKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.icon())
    }
}
