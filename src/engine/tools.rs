//! Path, time and filter utilities

use std::fs::Metadata;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use walkdir::WalkDir;

use crate::error::ScanError;
use crate::utils::config::HIDDEN_MARKER;

/// Store key for a path: the raw OS bytes, so every distinct file name keeps its own key.
#[cfg(unix)]
pub fn path_to_key(path: &Path) -> Vec<u8> {
    use std::os::unix::ffi::OsStrExt;
    path.as_os_str().as_bytes().to_vec()
}

#[cfg(not(unix))]
pub fn path_to_key(path: &Path) -> Vec<u8> {
    path.to_string_lossy().into_owned().into_bytes()
}

/// Inverse of [`path_to_key`].
#[cfg(unix)]
pub fn key_to_path(key: Vec<u8>) -> PathBuf {
    use std::ffi::OsString;
    use std::os::unix::ffi::OsStringExt;
    PathBuf::from(OsString::from_vec(key))
}

#[cfg(not(unix))]
pub fn key_to_path(key: Vec<u8>) -> PathBuf {
    PathBuf::from(String::from_utf8_lossy(&key).into_owned())
}

/// Whole seconds since the epoch, truncated toward zero (pre-epoch times are negative).
pub fn system_time_secs(t: SystemTime) -> i64 {
    match t.duration_since(UNIX_EPOCH) {
        Ok(d) => d.as_secs() as i64,
        Err(e) => -(e.duration().as_secs() as i64),
    }
}

/// Freshness token of a file: its modification time in whole seconds.
pub fn mtime_secs(meta: &Metadata) -> i64 {
    meta.modified().map(system_time_secs).unwrap_or(0)
}

/// Stat `path` and return its freshness token.
pub fn file_mtime(path: &Path) -> Result<i64, ScanError> {
    std::fs::metadata(path)
        .map(|m| mtime_secs(&m))
        .map_err(|e| ScanError::io(path, e))
}

/// Current time in whole seconds since the epoch.
pub fn unix_now() -> i64 {
    system_time_secs(SystemTime::now())
}

/// True for dotfiles and OS metadata files that never belong in a listing.
pub fn is_hidden_name(name: &str) -> bool {
    if name.starts_with(HIDDEN_MARKER) {
        return true;
    }
    matches!(
        name,
        "Thumbs.db" | "ehthumbs.db" | "Desktop.ini" | "desktop.ini" | "$RECYCLE.BIN"
    )
}

/// Lowercase extension without the dot, if any.
pub fn extension_lower(path: &Path) -> Option<String> {
    path.extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty())
        .map(|e| e.to_lowercase())
}

/// Expand a batch path: a directory becomes every regular file below it, a file is returned as is.
/// Unreadable entries are logged and skipped.
pub fn expand_path(path: &Path) -> Vec<PathBuf> {
    if !path.is_dir() {
        return vec![path.to_path_buf()];
    }
    let mut files = Vec::new();
    for entry in WalkDir::new(path).follow_links(false) {
        match entry {
            Ok(entry) => {
                let is_file = entry.file_type().is_file()
                    || (entry.path_is_symlink() && entry.path().is_file());
                if is_file {
                    files.push(entry.into_path());
                }
            }
            Err(err) => {
                log::warn!("Skipping unreadable entry while expanding {}: {}", path.display(), err);
            }
        }
    }
    files
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn system_time_secs_truncates() {
        let t = UNIX_EPOCH + Duration::from_millis(1_500);
        assert_eq!(system_time_secs(t), 1);
        let t = UNIX_EPOCH - Duration::from_millis(1_500);
        assert_eq!(system_time_secs(t), -1);
    }

    #[cfg(unix)]
    #[test]
    fn keys_keep_raw_bytes() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;
        let odd = Path::new(OsStr::from_bytes(b"/m/caf\xe9 a\\b.mkv"));
        let key = path_to_key(odd);
        assert_eq!(key, b"/m/caf\xe9 a\\b.mkv".to_vec());
        assert_ne!(key, path_to_key(Path::new("/m/caf/a/b.mkv")));
        assert_eq!(key_to_path(key), odd.to_path_buf());
    }

    #[test]
    fn hidden_names() {
        assert!(is_hidden_name(".DS_Store"));
        assert!(is_hidden_name(".hidden"));
        assert!(is_hidden_name("Thumbs.db"));
        assert!(!is_hidden_name("movie.mkv"));
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(extension_lower(Path::new("/a/B.MKV")).as_deref(), Some("mkv"));
        assert_eq!(extension_lower(Path::new("/a/noext")), None);
    }
}
