//! Application configuration constants.
//! Tuning and defaults in one place.

use std::path::PathBuf;
use std::sync::OnceLock;
use std::time::Duration;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    data_dir_name: String,
    db_filename: String,
    settings_filename: String,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Env var overriding the data directory.
    pub const HOME_ENV: &'static str = "INCSCAN_HOME";
    /// Env var overriding the settings file path (may come from `.env`).
    pub const CONFIG_ENV: &'static str = "INCSCAN_CONFIG";

    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                data_dir_name: format!(".{pkg}"),
                db_filename: "fingerprints.db".to_string(),
                settings_filename: "settings.toml".to_string(),
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// `$INCSCAN_HOME`, else `$HOME/.incscan`, else `./.incscan`.
    pub fn data_dir(&self) -> PathBuf {
        if let Ok(dir) = std::env::var(Self::HOME_ENV)
            && !dir.trim().is_empty()
        {
            return PathBuf::from(dir.trim());
        }
        std::env::var_os("HOME")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("."))
            .join(&self.data_dir_name)
    }

    pub fn default_db_path(&self) -> PathBuf {
        self.data_dir().join(&self.db_filename)
    }

    pub fn default_settings_path(&self) -> PathBuf {
        self.data_dir().join(&self.settings_filename)
    }
}

// ---- Scan pipeline ----

/// Worker pool and coordinator tuning.
pub struct ScanConsts;

impl ScanConsts {
    pub const DEFAULT_CONCURRENCY: usize = 4;
    /// Coordinator poll interval. Must stay strictly positive and sub-second.
    pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);
    pub const MIN_POLL_MS: u64 = 1;
    pub const MAX_POLL_MS: u64 = 999;
    /// Id of the transient progress indicator shown while a library is being tested.
    pub const PROGRESS_ID: &'static str = "libraryScanProgress";
    /// Thread name prefix of tester workers: `<prefix>-<library>-<n>`.
    pub const WORKER_NAME_PREFIX: &'static str = "incscan-file-tester";
}

/// Clamp a configured poll interval into the allowed sub-second window.
pub fn clamp_poll_interval(ms: u64) -> Duration {
    Duration::from_millis(ms.clamp(ScanConsts::MIN_POLL_MS, ScanConsts::MAX_POLL_MS))
}

// ---- Classification ----

/// Allow-list used when a library does not configure one.
pub const DEFAULT_ALLOWED_EXTENSIONS: &[&str] = &[
    "mp4", "mkv", "webm", "avi", "mov", "flv", "mp3", "m4a", "flac",
];

/// Prefix marking hidden entries in a directory listing.
pub const HIDDEN_MARKER: char = '.';

// ---- Database ----

/// Table holding timestamp-only records of library `id` is `<prefix><id>`.
pub const TIMESTAMP_NAMESPACE_PREFIX: &str = "timestamps_";

/// Busy timeout for concurrent writers on the same DB file (ms).
pub const DB_BUSY_TIMEOUT_MS: u64 = 5_000;
