//! Settings file (`settings.toml`): store location, scan tuning, libraries and metadata providers.
//!
//! Defaults are applied once here; every other module reads typed fields.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::catalog::{LibraryCatalog, LibraryConfigSource};
use crate::types::{Library, LibraryConfig, LibraryId};
use crate::utils::config::{
    DEFAULT_ALLOWED_EXTENSIONS, PackagePaths, ScanConsts, clamp_poll_interval,
};

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    #[serde(default)]
    store: StoreSection,
    #[serde(default)]
    scan: ScanSection,
    #[serde(default, rename = "library")]
    libraries: Vec<LibrarySection>,
    #[serde(default, rename = "provider")]
    providers: Vec<ProviderConfig>,
}

#[derive(Debug, Default, Deserialize)]
struct StoreSection {
    path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ScanSection {
    concurrency: Option<usize>,
    poll_interval_ms: Option<u64>,
    record_on_test: Option<bool>,
    quiet_caching: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct LibrarySection {
    id: LibraryId,
    name: Option<String>,
    path: PathBuf,
    #[serde(default)]
    remote_only: bool,
    /// Either a list or a comma-separated string.
    allowed_extensions: Option<Extensions>,
    /// Provider names run for this library; every enabled provider when absent.
    providers: Option<Vec<String>>,
    quiet_caching: Option<bool>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Extensions {
    List(Vec<String>),
    Csv(String),
}

/// External metadata program. `{path}` in `args` is replaced by the file path.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
pub struct ProviderConfig {
    pub name: String,
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

/// Scan tuning with defaults applied.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScanSettings {
    pub concurrency: usize,
    pub poll_interval: Duration,
    /// Record the current mtime when a test finds a file changed.
    pub record_on_test: bool,
    /// Default for libraries that do not set `quiet_caching` themselves.
    pub quiet_caching: bool,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            concurrency: ScanConsts::DEFAULT_CONCURRENCY,
            poll_interval: ScanConsts::DEFAULT_POLL_INTERVAL,
            record_on_test: true,
            quiet_caching: false,
        }
    }
}

#[derive(Clone, Debug)]
struct LibraryEntry {
    library: Library,
    config: LibraryConfig,
}

/// Loaded settings. Also serves as the library catalog and per-library config source.
#[derive(Clone, Debug)]
pub struct Settings {
    pub db_path: PathBuf,
    pub scan: ScanSettings,
    pub providers: Vec<ProviderConfig>,
    libraries: Vec<LibraryEntry>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            db_path: PackagePaths::get().default_db_path(),
            scan: ScanSettings::default(),
            providers: Vec::new(),
            libraries: Vec::new(),
        }
    }
}

/// Trim, drop the leading dot, lowercase; empty entries removed.
pub fn normalize_extensions<I, S>(raw: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    raw.into_iter()
        .map(|e| e.as_ref().trim().trim_start_matches('.').to_lowercase())
        .filter(|e| !e.is_empty())
        .collect()
}

impl Settings {
    /// Parse settings from TOML text.
    pub fn from_toml_str(s: &str) -> Result<Self> {
        let file: SettingsFile = toml::from_str(s).context("parse settings")?;
        Ok(Self::from_file(file))
    }

    /// Load from `path`; a missing file yields defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            log::debug!("No settings at {}, using defaults", path.display());
            return Ok(Self::default());
        }
        let s = std::fs::read_to_string(path)
            .with_context(|| format!("read settings {}", path.display()))?;
        Self::from_toml_str(&s).with_context(|| format!("in {}", path.display()))
    }

    /// Resolve the settings path: explicit arg → `INCSCAN_CONFIG` (env or `.env`) → data dir default.
    pub fn locate(explicit: Option<&Path>) -> PathBuf {
        if let Some(p) = explicit {
            return p.to_path_buf();
        }
        let _ = dotenvy::dotenv();
        match std::env::var(PackagePaths::CONFIG_ENV) {
            Ok(p) if !p.trim().is_empty() => PathBuf::from(p.trim()),
            _ => PackagePaths::get().default_settings_path(),
        }
    }

    fn from_file(file: SettingsFile) -> Self {
        let defaults = ScanSettings::default();
        let scan = ScanSettings {
            concurrency: file.scan.concurrency.unwrap_or(defaults.concurrency).max(1),
            poll_interval: file
                .scan
                .poll_interval_ms
                .map(clamp_poll_interval)
                .unwrap_or(defaults.poll_interval),
            record_on_test: file.scan.record_on_test.unwrap_or(defaults.record_on_test),
            quiet_caching: file.scan.quiet_caching.unwrap_or(defaults.quiet_caching),
        };
        let mut settings = Self {
            db_path: file
                .store
                .path
                .unwrap_or_else(|| PackagePaths::get().default_db_path()),
            scan,
            providers: file.providers,
            libraries: Vec::new(),
        };
        let libraries = file
            .libraries
            .into_iter()
            .map(|l| {
                let defaults = settings.default_library_config();
                let config = LibraryConfig {
                    allowed_extensions: match l.allowed_extensions {
                        Some(Extensions::List(v)) => normalize_extensions(v),
                        Some(Extensions::Csv(s)) => normalize_extensions(s.split(',')),
                        None => defaults.allowed_extensions,
                    },
                    enabled_providers: l.providers.unwrap_or(defaults.enabled_providers),
                    quiet_caching: l.quiet_caching.unwrap_or(defaults.quiet_caching),
                };
                LibraryEntry {
                    library: Library {
                        id: l.id,
                        name: l.name.unwrap_or_else(|| format!("Library {}", l.id)),
                        path: l.path,
                        remote_only: l.remote_only,
                    },
                    config,
                }
            })
            .collect();
        settings.libraries = libraries;
        settings
    }

    /// Config for libraries without their own entries: default extensions, every enabled
    /// provider, and the scan-wide `quiet_caching`.
    fn default_library_config(&self) -> LibraryConfig {
        LibraryConfig {
            allowed_extensions: normalize_extensions(DEFAULT_ALLOWED_EXTENSIONS.iter()),
            enabled_providers: self.enabled_providers().map(|p| p.name.clone()).collect(),
            quiet_caching: self.scan.quiet_caching,
        }
    }

    /// Add or replace a library (used by embedders and tests that build settings in code).
    /// Provider defaults come from the providers configured at call time.
    pub fn with_library(self, library: Library, extensions: Option<&[&str]>) -> Self {
        let mut config = self.default_library_config();
        if let Some(e) = extensions {
            config.allowed_extensions = normalize_extensions(e.iter());
        }
        self.with_library_config(library, config)
    }

    /// Add or replace a library with a fully specified config.
    pub fn with_library_config(mut self, library: Library, config: LibraryConfig) -> Self {
        self.libraries.retain(|e| e.library.id != library.id);
        self.libraries.push(LibraryEntry { library, config });
        self
    }

    pub fn enabled_providers(&self) -> impl Iterator<Item = &ProviderConfig> {
        self.providers.iter().filter(|p| p.enabled)
    }
}

impl LibraryCatalog for Settings {
    fn all_libraries(&self) -> Vec<Library> {
        self.libraries.iter().map(|e| e.library.clone()).collect()
    }

    fn library(&self, id: LibraryId) -> Option<Library> {
        self.libraries
            .iter()
            .find(|e| e.library.id == id)
            .map(|e| e.library.clone())
    }
}

impl LibraryConfigSource for Settings {
    fn library_config(&self, id: LibraryId) -> LibraryConfig {
        self.libraries
            .iter()
            .find(|e| e.library.id == id)
            .map(|e| e.config.clone())
            .unwrap_or_else(|| self.default_library_config())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_libraries_and_applies_defaults() {
        let s = Settings::from_toml_str(
            r#"
            [store]
            path = "/tmp/x.db"

            [scan]
            concurrency = 0
            poll_interval_ms = 5000

            [[library]]
            id = 1
            name = "Movies"
            path = "/media/movies"
            allowed_extensions = " .MKV, mp4 ,,"

            [[library]]
            id = 2
            path = "/media/remote"
            remote_only = true

            [[provider]]
            name = "ffprobe"
            program = "ffprobe"
            args = ["-show_format", "{path}"]
            enabled = false
            "#,
        )
        .unwrap();
        assert_eq!(s.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(s.scan.concurrency, 1);
        assert_eq!(s.scan.poll_interval, Duration::from_millis(999));
        assert!(s.scan.record_on_test);
        assert_eq!(s.library_config(1).allowed_extensions, vec!["mkv", "mp4"]);
        assert_eq!(
            s.library_config(2).allowed_extensions.len(),
            DEFAULT_ALLOWED_EXTENSIONS.len()
        );
        assert_eq!(s.library(2).unwrap().name, "Library 2");
        assert_eq!(s.local_libraries().len(), 1);
        assert_eq!(s.enabled_providers().count(), 0);
    }

    #[test]
    fn extensions_list_form() {
        let s = Settings::from_toml_str(
            r#"
            [[library]]
            id = 7
            path = "/m"
            allowed_extensions = ["FLAC", ".opus"]
            "#,
        )
        .unwrap();
        assert_eq!(s.library_config(7).allowed_extensions, vec!["flac", "opus"]);
    }

    #[test]
    fn providers_and_quiet_caching_per_library() {
        let s = Settings::from_toml_str(
            r#"
            [scan]
            quiet_caching = true

            [[library]]
            id = 1
            path = "/media/movies"

            [[library]]
            id = 2
            path = "/media/music"
            providers = []
            quiet_caching = false

            [[provider]]
            name = "ffprobe"
            program = "ffprobe"

            [[provider]]
            name = "mediainfo"
            program = "mediainfo"
            enabled = false
            "#,
        )
        .unwrap();
        let movies = s.library_config(1);
        assert_eq!(movies.enabled_providers, vec!["ffprobe"]);
        assert!(movies.quiet_caching);
        assert!(movies.provider_enabled("ffprobe"));
        assert!(!movies.provider_enabled("mediainfo"));

        let music = s.library_config(2);
        assert!(music.enabled_providers.is_empty());
        assert!(!music.quiet_caching);

        // Unknown libraries fall back to the same defaults.
        assert_eq!(s.library_config(9).enabled_providers, vec!["ffprobe"]);
    }
}
