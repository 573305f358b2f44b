use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::types::{BatchItem, LibraryId};

/// Incremental media library scanner.
#[derive(Clone, Debug, Parser)]
#[command(name = "incscan")]
#[command(about = "Skip unchanged files when rescanning media libraries.")]
pub struct Cli {
    /// Settings file. Default: $INCSCAN_CONFIG, else settings.toml in the data directory.
    #[arg(long, short = 'c', global = true)]
    pub config: Option<PathBuf>,

    /// Fingerprint store file; overrides [store] path of the settings file.
    #[arg(long, short, global = true)]
    pub db: Option<PathBuf>,

    /// Verbose output (debug logs, progress bar).
    #[arg(long, short = 'v', global = true, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Library id plus one or more paths inside it.
#[derive(Clone, Debug, Args)]
pub struct BatchArgs {
    /// Library id the paths belong to.
    #[arg(long, short = 'l')]
    pub library: LibraryId,

    /// Files or directories (absolute, inside the library root).
    #[arg(value_name = "PATH", required = true, num_args = 1..)]
    pub paths: Vec<PathBuf>,

    /// Priority score handed downstream.
    #[arg(long, short = 'p')]
    pub priority: Option<i64>,
}

impl BatchArgs {
    pub fn items(&self) -> Vec<BatchItem> {
        self.paths
            .iter()
            .map(|path| BatchItem {
                library_id: self.library,
                path: path.clone(),
                priority_score: self.priority,
            })
            .collect()
    }
}

#[derive(Clone, Debug, Subcommand)]
pub enum Commands {
    /// List locally scannable libraries.
    Libraries,
    /// Print the full tree below PATH with stored timestamps.
    Subtree {
        #[arg(long, short = 'l')]
        library: LibraryId,
        #[arg(value_name = "PATH")]
        path: PathBuf,
    },
    /// Test files and print the changed ones as JSON lines.
    Test(BatchArgs),
    /// Print every allowed file as a JSON line without testing it.
    Process(BatchArgs),
    /// Mark files as changed for the next scan.
    Reset(BatchArgs),
    /// Mark files as up to date.
    Update(BatchArgs),
    /// Remove records of deleted or out-of-scope files.
    Prune {
        /// Only this library. Default: every local library and provider caches.
        #[arg(long, short = 'l')]
        library: Option<LibraryId>,
    },
    /// Call a JSON API endpoint, e.g. `api /subtree '{"library_id":1,"path":"/media/tv"}'`.
    Api {
        #[arg(value_name = "ENDPOINT")]
        endpoint: String,
        #[arg(value_name = "JSON", default_value = "")]
        body: String,
    },
}

impl Cli {
    pub fn is_verbose(&self) -> bool {
        self.verbose.unwrap_or(false)
    }
}
