//! Engine module: fingerprint store, CLI, progress reporting and path tools

pub mod arg_parser;
pub mod cli;
pub mod db_ops;
pub mod progress;
pub mod tools;

// Re-export commonly used items
pub use arg_parser::{BatchArgs, Cli, Commands};
pub use cli::handle_run;
pub use db_ops::{FingerprintRecord, FingerprintStore, Namespace, StoreSession, open_db};
pub use progress::{KdamProgress, LogProgress, NoopProgress, ProgressChannel, ScanStatus};
pub use tools::{expand_path, file_mtime, key_to_path, path_to_key};
