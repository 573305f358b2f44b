//! CLI command handler: build the scanner from settings and run one subcommand.

use anyhow::{Result, anyhow};
use log::{debug, info};
use serde::Serialize;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use crate::api::Api;
use crate::engine::arg_parser::{Cli, Commands};
use crate::engine::progress::{KdamProgress, NoopProgress, ProgressChannel};
use crate::pipeline::{BatchStatus, JsonLinesQueue};
use crate::tree::list_libraries;
use crate::utils::settings::Settings;
use crate::utils::setup_logging;

fn load_settings(cli: &Cli) -> Result<Settings> {
    let path = Settings::locate(cli.config.as_deref());
    debug!("Settings file: {}", path.display());
    let mut settings = Settings::load(&path)?;
    if let Some(db) = &cli.db {
        settings.db_path = db.clone();
    }
    debug!("Fingerprint store: {}", settings.db_path.display());
    Ok(settings)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Run the parsed command to completion. Background jobs started by it are waited for.
pub fn handle_run(cli: &Cli) -> Result<()> {
    setup_logging(cli.is_verbose());
    let settings = load_settings(cli)?;
    let progress: Arc<dyn ProgressChannel> = if cli.is_verbose() {
        Arc::new(KdamProgress::new("Testing"))
    } else {
        Arc::new(NoopProgress)
    };
    let poll = settings.scan.poll_interval;
    let api = Api::from_settings(settings, Arc::new(JsonLinesQueue), progress)?;

    match &cli.command {
        Commands::Libraries => print_json(&list_libraries(api.settings()))?,
        Commands::Subtree { library, path } => {
            let title = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default();
            let node = api.tree().subtree(api.settings(), *library, path, &title)?;
            print_json(&node)?;
        }
        Commands::Test(batch) => {
            let handle = match api.pipeline().test_files(batch.items())? {
                BatchStatus::Started(handle) => handle,
                BatchStatus::Rejected => return Err(anyhow!("a scan is already running")),
            };
            let cancel = handle.cancel_flag();
            ctrlc::set_handler(move || {
                eprintln!("Stopping after current files...");
                cancel.store(true, Ordering::Release);
            })?;
            for summary in handle.join()? {
                info!(
                    "Library {}: {} of {} changed{}",
                    summary.library_id,
                    summary.forwarded,
                    summary.total,
                    if summary.cancelled { " (cancelled)" } else { "" }
                );
            }
        }
        Commands::Process(batch) => {
            api.pipeline().process_files(batch.items())?;
        }
        Commands::Reset(batch) => {
            api.timestamps().reset_timestamps(&batch.items())?;
        }
        Commands::Update(batch) => {
            api.timestamps().update_timestamps(&batch.items())?;
        }
        Commands::Prune { library } => match api.prune().run(*library)? {
            Some(report) => print_json(&report)?,
            None => return Err(anyhow!("a prune is already running")),
        },
        Commands::Api { endpoint, body } => {
            let response = api.handle(endpoint, body);
            // Fire-and-forget endpoints keep working after the response.
            while api.pipeline().is_running() || api.prune().is_running() {
                thread::sleep(poll);
            }
            print_json(&response)?;
        }
    }
    Ok(())
}
