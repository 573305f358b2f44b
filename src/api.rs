//! JSON request dispatcher over the scanner's logical operations.
//!
//! Every endpoint accepts a JSON body and answers a JSON value. Failures become
//! `{"success": false, "error": ..., "trace": ...}`; fire-and-forget endpoints answer
//! `{"success": true}` as soon as the work is accepted.

use anyhow::{Context, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::path::PathBuf;
use std::sync::Arc;

use crate::analyzer::{Analyzer, AnalyzerChain, MetadataCacheAnalyzer, TimestampAnalyzer};
use crate::catalog::LibraryCatalog;
use crate::classify::PathClassifier;
use crate::engine::db_ops::{FingerprintStore, Namespace};
use crate::engine::progress::ProgressChannel;
use crate::pipeline::{ScanPipeline, TaskQueue};
use crate::prune::PruneJob;
use crate::timestamps::TimestampKeeper;
use crate::tree::{TreeLoader, list_libraries};
use crate::types::{Batch, BatchItem, LibraryId};
use crate::utils::settings::Settings;

#[derive(Debug, Deserialize)]
struct SubtreeRequest {
    library_id: LibraryId,
    path: PathBuf,
    #[serde(default)]
    title: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct PruneRequest {
    #[serde(default)]
    library_id: Option<LibraryId>,
}

/// Wired-up scanner: one store, one classifier, one pipeline, one prune job.
pub struct Api {
    settings: Arc<Settings>,
    store: Arc<FingerprintStore>,
    classifier: Arc<PathClassifier>,
    tree: TreeLoader,
    pipeline: ScanPipeline,
    timestamps: TimestampKeeper,
    prune: Arc<PruneJob>,
}

impl Api {
    /// Open the store with every namespace the settings imply and build the analyzer chain:
    /// timestamps first, then metadata caching when providers are enabled.
    pub fn from_settings(
        settings: Settings,
        queue: Arc<dyn TaskQueue>,
        progress: Arc<dyn ProgressChannel>,
    ) -> Result<Self> {
        let settings = Arc::new(settings);
        let catalog: Arc<dyn LibraryCatalog> = settings.clone();
        let classifier = Arc::new(PathClassifier::new(settings.clone()));

        let store = Arc::new(FingerprintStore::new(&settings.db_path));
        let metadata = MetadataCacheAnalyzer::from_configs(
            Arc::clone(&store),
            settings.enabled_providers(),
            settings.clone(),
        )?;
        let mut namespaces: Vec<Namespace> = settings
            .all_libraries()
            .iter()
            .map(|l| Namespace::timestamps(l.id))
            .collect();
        let metadata_namespaces: Vec<Namespace> = metadata.namespaces().cloned().collect();
        namespaces.extend(metadata_namespaces.iter().cloned());
        store.initialize(&namespaces)?;

        let mut analyzers: Vec<Arc<dyn Analyzer>> = vec![Arc::new(TimestampAnalyzer::new(
            Arc::clone(&store),
            settings.scan.record_on_test,
        ))];
        if !metadata_namespaces.is_empty() {
            analyzers.push(Arc::new(metadata));
        }

        let pipeline = ScanPipeline::new(
            Arc::clone(&catalog),
            Arc::clone(&classifier),
            Arc::new(AnalyzerChain::new(analyzers)),
            queue,
        )
        .with_progress(progress)
        .with_concurrency(settings.scan.concurrency)
        .with_poll_interval(settings.scan.poll_interval);

        let prune = PruneJob::new(
            Arc::clone(&catalog),
            Arc::clone(&classifier),
            Arc::clone(&store),
        )
        .with_metadata_namespaces(metadata_namespaces);

        Ok(Self {
            tree: TreeLoader::new(Arc::clone(&classifier), Arc::clone(&store)),
            timestamps: TimestampKeeper::new(catalog, Arc::clone(&classifier), Arc::clone(&store)),
            prune: Arc::new(prune),
            settings,
            store,
            classifier,
            pipeline,
        })
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn store(&self) -> &Arc<FingerprintStore> {
        &self.store
    }

    pub fn classifier(&self) -> &Arc<PathClassifier> {
        &self.classifier
    }

    pub fn tree(&self) -> &TreeLoader {
        &self.tree
    }

    pub fn pipeline(&self) -> &ScanPipeline {
        &self.pipeline
    }

    pub fn timestamps(&self) -> &TimestampKeeper {
        &self.timestamps
    }

    pub fn prune(&self) -> &Arc<PruneJob> {
        &self.prune
    }

    /// Dispatch one request. Never fails; errors are rendered into the response.
    pub fn handle(&self, endpoint: &str, body: &str) -> Value {
        match self.dispatch(endpoint, body) {
            Ok(value) => value,
            Err(err) => {
                log::error!("{} failed: {:#}", endpoint, err);
                error_response(&err)
            }
        }
    }

    fn dispatch(&self, endpoint: &str, body: &str) -> Result<Value> {
        match endpoint {
            "/libraries" => Ok(serde_json::to_value(list_libraries(self.settings.as_ref()))?),
            "/subtree" => {
                let req: SubtreeRequest = parse_body(body)?;
                let title = req.title.unwrap_or_else(|| {
                    req.path
                        .file_name()
                        .map(|n| n.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
                let node =
                    self.tree
                        .subtree(self.settings.as_ref(), req.library_id, &req.path, &title)?;
                Ok(serde_json::to_value(node)?)
            }
            "/test" => {
                self.pipeline.test_files(parse_batch(body)?)?;
                Ok(success())
            }
            "/process" => {
                self.pipeline.process_files(parse_batch(body)?)?;
                Ok(success())
            }
            "/timestamp/reset" => {
                self.timestamps.reset_timestamps(&parse_batch(body)?)?;
                Ok(success())
            }
            "/timestamp/update" => {
                self.timestamps.update_timestamps(&parse_batch(body)?)?;
                Ok(success())
            }
            "/prune" => {
                let req: PruneRequest = if body.trim().is_empty() {
                    PruneRequest::default()
                } else {
                    parse_body(body)?
                };
                self.prune.spawn(req.library_id)?;
                Ok(success())
            }
            other => Ok(json!({
                "success": false,
                "error": format!("unknown path: {other}"),
            })),
        }
    }
}

fn parse_body<T: DeserializeOwned>(body: &str) -> Result<T> {
    serde_json::from_str(body).context("invalid request body")
}

/// Either `{"arr": [...]}` or a single bare item.
fn parse_batch(body: &str) -> Result<Vec<BatchItem>> {
    Ok(parse_body::<Batch<BatchItem>>(body)?.into_vec())
}

fn success() -> Value {
    json!({ "success": true })
}

/// `{"success": false, "error": <message>, "trace": <full context chain>}`.
pub fn error_response(err: &anyhow::Error) -> Value {
    json!({
        "success": false,
        "error": err.to_string(),
        "trace": format!("{err:?}"),
    })
}
