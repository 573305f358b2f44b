//! The analyzer contract and the built-in analyzers.
//!
//! A scan worker calls [`Analyzer::open_tester`] once on its own thread and then feeds every path
//! it pops to the returned [`FileTester`]. Testers own per-thread state such as a store session.
//! Fingerprint writes happen here, never in the pipeline.

use anyhow::{Context, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use std::sync::Arc;

use crate::catalog::LibraryConfigSource;
use crate::engine::db_ops::{FingerprintStore, Namespace, StoreSession};
use crate::engine::tools::file_mtime;
use crate::error::ScanError;
use crate::types::{LibraryConfig, LibraryId, SharedInfo, Verdict};
use crate::utils::settings::ProviderConfig;

/// Factory of per-worker testers. Must be safe to use from many workers at once.
pub trait Analyzer: Send + Sync {
    fn open_tester(&self) -> Result<Box<dyn FileTester + '_>>;
}

/// Tests one file at a time on a single worker thread.
pub trait FileTester {
    fn test(&mut self, library_id: LibraryId, path: &Path) -> Result<Verdict>;
}

/// Adapts a plain function into a stateless analyzer.
pub struct FnAnalyzer<F>(pub F);

struct FnTester<'a, F>(&'a F);

impl<F> FnAnalyzer<F>
where
    F: Fn(LibraryId, &Path) -> Result<Verdict> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        FnAnalyzer(f)
    }
}

impl<F> Analyzer for FnAnalyzer<F>
where
    F: Fn(LibraryId, &Path) -> Result<Verdict> + Send + Sync,
{
    fn open_tester(&self) -> Result<Box<dyn FileTester + '_>> {
        Ok(Box::new(FnTester(&self.0)))
    }
}

impl<F> FileTester for FnTester<'_, F>
where
    F: Fn(LibraryId, &Path) -> Result<Verdict>,
{
    fn test(&mut self, library_id: LibraryId, path: &Path) -> Result<Verdict> {
        (self.0)(library_id, path)
    }
}

// ---- Timestamp analyzer ----

/// Skips files whose mtime equals the stored token of their library's timestamp namespace.
pub struct TimestampAnalyzer {
    store: Arc<FingerprintStore>,
    record_on_test: bool,
}

impl TimestampAnalyzer {
    pub fn new(store: Arc<FingerprintStore>, record_on_test: bool) -> Self {
        Self {
            store,
            record_on_test,
        }
    }
}

struct TimestampTester<'s> {
    session: StoreSession<'s>,
    record_on_test: bool,
}

impl Analyzer for TimestampAnalyzer {
    fn open_tester(&self) -> Result<Box<dyn FileTester + '_>> {
        Ok(Box::new(TimestampTester {
            session: self.store.session()?,
            record_on_test: self.record_on_test,
        }))
    }
}

impl FileTester for TimestampTester<'_> {
    fn test(&mut self, library_id: LibraryId, path: &Path) -> Result<Verdict> {
        let mtime = file_mtime(path)?;
        let ns = Namespace::timestamps(library_id);
        if self.session.get(&ns, path, Some(mtime))?.is_some() {
            log::debug!("unchanged: library_id={} path={}", library_id, path.display());
            return Ok(Verdict::Skip);
        }
        if self.record_on_test {
            self.session.put(&ns, path, mtime, None)?;
        }
        Ok(Verdict::forward())
    }
}

// ---- Metadata cache analyzer ----

/// Slow external producer of per-file metadata.
pub trait MetadataProvider: Send + Sync {
    fn name(&self) -> &str;
    /// `Ok(None)` is a valid "no data" answer and is cached like any other.
    fn run(&self, path: &Path) -> Result<Option<Value>>;
}

/// Runs an external program and parses its stdout as JSON.
pub struct CommandProvider {
    config: ProviderConfig,
}

impl CommandProvider {
    pub const PATH_PLACEHOLDER: &'static str = "{path}";

    pub fn new(config: ProviderConfig) -> Self {
        Self { config }
    }
}

impl MetadataProvider for CommandProvider {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn run(&self, path: &Path) -> Result<Option<Value>> {
        let path_str = path.to_string_lossy();
        let args: Vec<String> = self
            .config
            .args
            .iter()
            .map(|a| a.replace(Self::PATH_PLACEHOLDER, &path_str))
            .collect();
        let output = Command::new(&self.config.program)
            .args(&args)
            .output()
            .with_context(|| format!("spawn {}", self.config.program))?;
        if !output.status.success() {
            return Err(ScanError::Analyzer {
                path: path.to_path_buf(),
                message: format!(
                    "{} exited with {}: {}",
                    self.config.program,
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            }
            .into());
        }
        if output.stdout.iter().all(u8::is_ascii_whitespace) {
            return Err(ScanError::Analyzer {
                path: path.to_path_buf(),
                message: format!("{} produced no output", self.config.program),
            }
            .into());
        }
        let value: Value = serde_json::from_slice(&output.stdout)
            .with_context(|| format!("parse {} output", self.config.program))?;
        Ok(match value {
            Value::Null => None,
            v => Some(v),
        })
    }
}

struct CachedProvider {
    namespace: Namespace,
    provider: Arc<dyn MetadataProvider>,
}

/// Memoizes provider output keyed by (provider, path) and guarded by the file's mtime.
/// Only the providers a library enables run for its files. Never decides to skip a file;
/// fresh and cached payloads are forwarded under the provider name.
pub struct MetadataCacheAnalyzer {
    store: Arc<FingerprintStore>,
    providers: Vec<CachedProvider>,
    libraries: Arc<dyn LibraryConfigSource>,
}

impl MetadataCacheAnalyzer {
    /// Provider names become namespaces and must be valid identifiers.
    pub fn new(
        store: Arc<FingerprintStore>,
        providers: Vec<Arc<dyn MetadataProvider>>,
        libraries: Arc<dyn LibraryConfigSource>,
    ) -> Result<Self> {
        let providers = providers
            .into_iter()
            .map(|provider| {
                Ok(CachedProvider {
                    namespace: Namespace::new(provider.name())?,
                    provider,
                })
            })
            .collect::<Result<Vec<_>, ScanError>>()?;
        Ok(Self {
            store,
            providers,
            libraries,
        })
    }

    pub fn from_configs<'a, I>(
        store: Arc<FingerprintStore>,
        configs: I,
        libraries: Arc<dyn LibraryConfigSource>,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = &'a ProviderConfig>,
    {
        let providers = configs
            .into_iter()
            .map(|c| Arc::new(CommandProvider::new(c.clone())) as Arc<dyn MetadataProvider>)
            .collect();
        Self::new(store, providers, libraries)
    }

    pub fn namespaces(&self) -> impl Iterator<Item = &Namespace> {
        self.providers.iter().map(|p| &p.namespace)
    }

    /// Cached payload of `provider` for `path` if still fresh. Outer `None`: nothing fresh cached.
    pub fn cached(&self, provider: &str, path: &Path) -> Result<Option<Option<Value>>> {
        let Some(p) = self.providers.iter().find(|p| p.provider.name() == provider) else {
            return Ok(None);
        };
        let mtime = file_mtime(path)?;
        Ok(self
            .store
            .get(&p.namespace, path, Some(mtime))?
            .map(|r| r.payload))
    }
}

struct MetadataTester<'a> {
    session: StoreSession<'a>,
    providers: &'a [CachedProvider],
    source: &'a dyn LibraryConfigSource,
    /// Config per library, looked up once per worker.
    libraries: HashMap<LibraryId, LibraryConfig>,
}

impl Analyzer for MetadataCacheAnalyzer {
    fn open_tester(&self) -> Result<Box<dyn FileTester + '_>> {
        Ok(Box::new(MetadataTester {
            session: self.store.session()?,
            providers: &self.providers,
            source: self.libraries.as_ref(),
            libraries: HashMap::new(),
        }))
    }
}

fn note(quiet: bool, msg: std::fmt::Arguments<'_>) {
    if quiet {
        log::debug!("{}", msg);
    } else {
        log::info!("{}", msg);
    }
}

impl FileTester for MetadataTester<'_> {
    fn test(&mut self, library_id: LibraryId, path: &Path) -> Result<Verdict> {
        let source = self.source;
        let config = self
            .libraries
            .entry(library_id)
            .or_insert_with(|| source.library_config(library_id));
        let quiet = config.quiet_caching;
        let enabled: Vec<&CachedProvider> = self
            .providers
            .iter()
            .filter(|p| config.provider_enabled(p.provider.name()))
            .collect();
        let mut shared_info = SharedInfo::new();
        if enabled.is_empty() {
            return Ok(Verdict::Forward {
                priority_score: None,
                shared_info,
            });
        }

        let mtime = file_mtime(path)?;
        for p in enabled {
            let name = p.provider.name();
            if let Some(record) = self.session.get(&p.namespace, path, Some(mtime))? {
                note(quiet, format_args!("Cached {} data found - {}", name, path.display()));
                shared_info.insert(name.to_string(), record.payload.unwrap_or(Value::Null));
                continue;
            }
            note(
                quiet,
                format_args!(
                    "No cached {} data found, refreshing - {}",
                    name,
                    path.display()
                ),
            );
            match p.provider.run(path) {
                Ok(payload) => {
                    self.session.put(&p.namespace, path, mtime, payload.as_ref())?;
                    shared_info.insert(name.to_string(), payload.unwrap_or(Value::Null));
                }
                Err(err) => log::error!(
                    "Could not retrieve {} metadata - {}: {:#}",
                    name,
                    path.display(),
                    err
                ),
            }
        }
        Ok(Verdict::Forward {
            priority_score: None,
            shared_info,
        })
    }
}

// ---- Chain ----

/// Runs analyzers in order. The first `Skip` wins; otherwise the highest priority score is kept
/// and the shared info of every tester is merged (later testers win on a name clash).
pub struct AnalyzerChain {
    analyzers: Vec<Arc<dyn Analyzer>>,
}

impl AnalyzerChain {
    pub fn new(analyzers: Vec<Arc<dyn Analyzer>>) -> Self {
        Self { analyzers }
    }
}

struct ChainTester<'a> {
    testers: Vec<Box<dyn FileTester + 'a>>,
}

impl Analyzer for AnalyzerChain {
    fn open_tester(&self) -> Result<Box<dyn FileTester + '_>> {
        let testers = self
            .analyzers
            .iter()
            .map(|a| a.open_tester())
            .collect::<Result<Vec<_>>>()?;
        Ok(Box::new(ChainTester { testers }))
    }
}

impl FileTester for ChainTester<'_> {
    fn test(&mut self, library_id: LibraryId, path: &Path) -> Result<Verdict> {
        let mut best: Option<i64> = None;
        let mut merged = SharedInfo::new();
        for tester in &mut self.testers {
            match tester.test(library_id, path)? {
                Verdict::Skip => return Ok(Verdict::Skip),
                Verdict::Forward {
                    priority_score,
                    shared_info,
                } => {
                    best = best.max(priority_score);
                    merged.extend(shared_info);
                }
            }
        }
        Ok(Verdict::Forward {
            priority_score: best,
            shared_info: merged,
        })
    }
}
