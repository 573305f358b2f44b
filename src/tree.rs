//! Directory tree views for the library browser.
//!
//! Folders come first, then files; each group is sorted by title. Freshness tokens of the files in
//! one listing are fetched with a single batched lookup.

use anyhow::Result;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::catalog::LibraryCatalog;
use crate::classify::{FileKind, PathClassifier, check_path};
use crate::engine::db_ops::{FingerprintStore, Namespace, StoreSession};
use crate::engine::tools::{is_hidden_name, mtime_secs};
use crate::error::ScanError;
use crate::types::LibraryId;

const FOLDER: &str = "folder";

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TreeNode {
    Folder(FolderNode),
    File(FileNode),
}

impl TreeNode {
    pub fn title(&self) -> &str {
        match self {
            TreeNode::Folder(f) => &f.title,
            TreeNode::File(f) => &f.title,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FolderNode {
    pub title: String,
    pub library_id: LibraryId,
    pub path: PathBuf,
    #[serde(rename = "type")]
    pub node_type: &'static str,
    /// Children not loaded yet; expand on demand.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub lazy: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub children: Option<Vec<TreeNode>>,
}

impl FolderNode {
    pub fn lazy(title: impl Into<String>, library_id: LibraryId, path: PathBuf) -> Self {
        Self {
            title: title.into(),
            library_id,
            path,
            node_type: FOLDER,
            lazy: true,
            children: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FileNode {
    pub title: String,
    pub library_id: LibraryId,
    pub path: PathBuf,
    pub mtime: i64,
    pub size: u64,
    pub icon: FileKind,
    /// Outer `None`: freshness not requested. `Some(None)`: no record stored.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<Option<i64>>,
}

/// Response of the library listing.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct LibraryListing {
    pub children: Vec<FolderNode>,
}

/// Every locally scannable library as a lazy root folder.
pub fn list_libraries(catalog: &dyn LibraryCatalog) -> LibraryListing {
    LibraryListing {
        children: catalog
            .local_libraries()
            .into_iter()
            .map(|l| FolderNode::lazy(l.name, l.id, l.path))
            .collect(),
    }
}

pub struct TreeLoader {
    classifier: Arc<PathClassifier>,
    store: Arc<FingerprintStore>,
}

impl TreeLoader {
    pub fn new(classifier: Arc<PathClassifier>, store: Arc<FingerprintStore>) -> Self {
        Self { classifier, store }
    }

    /// List `path` as a folder node. Fails if `path` itself cannot be listed.
    pub fn load_subtree(
        &self,
        path: &Path,
        title: &str,
        library_id: LibraryId,
        lazy: bool,
        include_freshness: bool,
    ) -> Result<FolderNode> {
        let session = if include_freshness {
            Some(self.store.session()?)
        } else {
            None
        };
        self.load_dir(session.as_ref(), path, title, library_id, lazy)
    }

    /// Validated, fully materialized subtree with freshness tokens, as served to the panel.
    pub fn subtree(
        &self,
        catalog: &dyn LibraryCatalog,
        library_id: LibraryId,
        path: &Path,
        title: &str,
    ) -> Result<FolderNode> {
        let library = catalog
            .library(library_id)
            .ok_or(ScanError::UnknownLibrary(library_id))?;
        if library.remote_only {
            return Err(ScanError::RemoteOnlyLibrary(library_id).into());
        }
        check_path(path, &library)?;
        self.load_subtree(path, title, library_id, false, true)
    }

    fn load_dir(
        &self,
        session: Option<&StoreSession<'_>>,
        path: &Path,
        title: &str,
        library_id: LibraryId,
        lazy: bool,
    ) -> Result<FolderNode> {
        let entries = fs::read_dir(path).map_err(|e| ScanError::io(path, e))?;
        let mut folders = Vec::new();
        let mut files = Vec::new();

        for entry in entries {
            let entry = match entry {
                Ok(entry) => entry,
                Err(err) => {
                    log::warn!("Skipping unreadable entry in {}: {}", path.display(), err);
                    continue;
                }
            };
            let name = entry.file_name().to_string_lossy().into_owned();
            if is_hidden_name(&name) {
                continue;
            }
            let abspath = path.join(&name);
            if abspath.is_dir() {
                if lazy {
                    folders.push(FolderNode::lazy(name, library_id, abspath));
                    continue;
                }
                match self.load_dir(session, &abspath, &name, library_id, false) {
                    Ok(node) => folders.push(node),
                    Err(err) => log::warn!("Skipping folder {}: {:#}", abspath.display(), err),
                }
            } else if self.classifier.is_allowed(library_id, Path::new(&name)) {
                match fs::metadata(&abspath) {
                    Ok(meta) => files.push(FileNode {
                        icon: FileKind::from_path(&abspath),
                        title: name,
                        library_id,
                        mtime: mtime_secs(&meta),
                        size: meta.len(),
                        path: abspath,
                        timestamp: None,
                    }),
                    Err(err) => log::warn!("Cannot stat {}: {}", abspath.display(), err),
                }
            }
        }

        folders.sort_by(|a, b| a.title.cmp(&b.title));
        files.sort_by(|a, b| a.title.cmp(&b.title));

        if let Some(session) = session {
            let paths: Vec<&Path> = files.iter().map(|f| f.path.as_path()).collect();
            let tokens = session.get_tokens(&Namespace::timestamps(library_id), &paths)?;
            for (file, token) in files.iter_mut().zip(tokens) {
                file.timestamp = Some(token);
            }
        }

        let children = folders
            .into_iter()
            .map(TreeNode::Folder)
            .chain(files.into_iter().map(TreeNode::File))
            .collect();

        Ok(FolderNode {
            title: title.to_string(),
            library_id,
            path: path.to_path_buf(),
            node_type: FOLDER,
            lazy: false,
            children: Some(children),
        })
    }
}
