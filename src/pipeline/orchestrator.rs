use anyhow::{Context, Result, anyhow};
use crossbeam_channel::RecvTimeoutError;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::analyzer::Analyzer;
use crate::catalog::LibraryCatalog;
use crate::classify::PathClassifier;
use crate::engine::progress::{NoopProgress, ProgressChannel, ScanStatus};
use crate::pipeline::batch::{expand_batch, resolve_batch, validate_batch};
use crate::pipeline::context::{RunChannels, RunState, create_run_channels};
use crate::pipeline::guard::{FlightPermit, SingleFlight};
use crate::pipeline::queue::TaskQueue;
use crate::pipeline::worker::{WorkerSetup, WorkerStats, spawn_file_testers};
use crate::types::{BatchItem, LibraryId, RunSummary, ScanItem, SharedInfo};
use crate::utils::config::ScanConsts;
use crate::utils::fd_limit::effective_worker_count;

/// Outcome of asking for a scan batch.
pub enum BatchStatus {
    Started(ScanRunHandle),
    /// Another batch is in flight; nothing was spawned.
    Rejected,
}

impl BatchStatus {
    pub fn is_started(&self) -> bool {
        matches!(self, BatchStatus::Started(_))
    }

    pub fn into_handle(self) -> Option<ScanRunHandle> {
        match self {
            BatchStatus::Started(handle) => Some(handle),
            BatchStatus::Rejected => None,
        }
    }
}

/// Handle to a running batch. Dropping it detaches the batch (fire-and-forget).
pub struct ScanRunHandle {
    cancel: Arc<AtomicBool>,
    coordinator: JoinHandle<Result<Vec<RunSummary>>>,
}

impl ScanRunHandle {
    /// Ask workers to stop after their current item. Output already produced is still forwarded.
    pub fn stop(&self) {
        self.cancel.store(true, Ordering::Release);
    }

    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_finished(&self) -> bool {
        self.coordinator.is_finished()
    }

    /// Wait for every library run of the batch.
    pub fn join(self) -> Result<Vec<RunSummary>> {
        self.coordinator
            .join()
            .map_err(|_| anyhow!("scan coordinator panicked"))?
    }
}

/// Everything a coordinator thread needs, detached from the pipeline that spawned it.
#[derive(Clone)]
struct RunContext {
    classifier: Arc<PathClassifier>,
    analyzer: Arc<dyn Analyzer>,
    queue: Arc<dyn TaskQueue>,
    progress: Arc<dyn ProgressChannel>,
    concurrency: usize,
    poll_interval: Duration,
}

/// Tests candidate files with a bounded pool of workers and forwards changed ones downstream.
pub struct ScanPipeline {
    catalog: Arc<dyn LibraryCatalog>,
    ctx: RunContext,
    guard: SingleFlight,
}

impl ScanPipeline {
    pub fn new(
        catalog: Arc<dyn LibraryCatalog>,
        classifier: Arc<PathClassifier>,
        analyzer: Arc<dyn Analyzer>,
        queue: Arc<dyn TaskQueue>,
    ) -> Self {
        Self {
            catalog,
            ctx: RunContext {
                classifier,
                analyzer,
                queue,
                progress: Arc::new(NoopProgress),
                concurrency: ScanConsts::DEFAULT_CONCURRENCY,
                poll_interval: ScanConsts::DEFAULT_POLL_INTERVAL,
            },
            guard: SingleFlight::new("scan"),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressChannel>) -> Self {
        self.ctx.progress = progress;
        self
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.ctx.concurrency = concurrency.max(1);
        self
    }

    /// Clamped to a strictly positive sub-second wait.
    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.ctx.poll_interval = poll_interval.clamp(
            Duration::from_millis(ScanConsts::MIN_POLL_MS),
            Duration::from_millis(ScanConsts::MAX_POLL_MS),
        );
        self
    }

    pub fn is_running(&self) -> bool {
        self.guard.is_busy()
    }

    /// Validate the whole batch, then test it on a background coordinator.
    ///
    /// Validation errors are returned before anything is spawned. A batch arriving while another
    /// is in flight is logged and answered with [`BatchStatus::Rejected`].
    pub fn test_files(&self, items: Vec<BatchItem>) -> Result<BatchStatus> {
        validate_batch(self.catalog.as_ref(), &items)?;
        let Some(permit) = self.guard.try_acquire() else {
            log::info!(
                "Rejected test batch of {} item(s): a scan is already running",
                items.len()
            );
            return Ok(BatchStatus::Rejected);
        };
        log::info!("Accepted test batch of {} item(s)", items.len());
        let cancel = Arc::new(AtomicBool::new(false));
        let ctx = self.ctx.clone();
        let flag = Arc::clone(&cancel);
        let coordinator = thread::Builder::new()
            .name("incscan-scan-coordinator".to_string())
            .spawn(move || run_batch(ctx, items, flag, permit))
            .context("spawn scan coordinator")?;
        Ok(BatchStatus::Started(ScanRunHandle {
            cancel,
            coordinator,
        }))
    }

    /// Forward every allowed file of the batch directly, bypassing analyzers.
    /// Returns how many items were enqueued.
    pub fn process_files(&self, items: Vec<BatchItem>) -> Result<usize> {
        let expanded = resolve_batch(self.catalog.as_ref(), &self.ctx.classifier, &items)?;
        let mut enqueued = 0;
        for (library_id, files) in expanded {
            for (path, priority_score) in files {
                let item = ScanItem {
                    library_id,
                    path,
                    priority_score,
                    shared_info: SharedInfo::new(),
                };
                match self.ctx.queue.enqueue(item) {
                    Ok(()) => enqueued += 1,
                    Err(err) => log::error!("Could not enqueue item: {:#}", err),
                }
            }
        }
        log::info!("Enqueued {} file(s) for processing", enqueued);
        Ok(enqueued)
    }
}

fn run_batch(
    ctx: RunContext,
    items: Vec<BatchItem>,
    cancel: Arc<AtomicBool>,
    _permit: FlightPermit,
) -> Result<Vec<RunSummary>> {
    let expanded = expand_batch(&ctx.classifier, &items);
    let mut summaries = Vec::with_capacity(expanded.len());
    for (library_id, files) in expanded {
        if cancel.load(Ordering::Acquire) {
            log::info!("Scan cancelled before library {}", library_id);
            break;
        }
        let paths: Vec<PathBuf> = files.into_keys().collect();
        match ctx.run_library(library_id, paths, &cancel) {
            Ok(summary) => summaries.push(summary),
            Err(err) => log::error!("Scan of library {} failed: {:#}", library_id, err),
        }
    }
    Ok(summaries)
}

impl RunContext {
    /// One library run: `PendingWork -> Draining -> Done`.
    fn run_library(
        &self,
        library_id: LibraryId,
        paths: Vec<PathBuf>,
        cancel: &Arc<AtomicBool>,
    ) -> Result<RunSummary> {
        let mut summary = RunSummary {
            library_id,
            ..RunSummary::default()
        };
        if paths.is_empty() {
            log::debug!("library {}: nothing to test", library_id);
            return Ok(summary);
        }

        let RunChannels {
            input_rx,
            output_tx,
            output_rx,
            progress_tx,
            progress_rx,
            total,
        } = create_run_channels(paths);
        summary.total = total;

        let workers_stop = Arc::new(AtomicBool::new(false));
        let setup = WorkerSetup {
            library_id,
            analyzer: Arc::clone(&self.analyzer),
            input_rx: input_rx.clone(),
            output_tx,
            progress_tx,
            stop: Arc::clone(&workers_stop),
            poll_interval: self.poll_interval,
        };
        let pool = effective_worker_count(self.concurrency).min(total);
        let handles = spawn_file_testers(&setup, pool)?;
        // Only workers hold senders now; a disconnected output means every worker exited.
        drop(setup);

        log::debug!(
            "library {}: {:?} with {} file(s), {} worker(s)",
            library_id,
            RunState::PendingWork,
            total,
            pool
        );

        let mut state = RunState::PendingWork;
        let mut forwarded = 0usize;
        let mut last_emit: Option<Instant> = None;
        let mut latest: Option<PathBuf> = None;

        while state == RunState::PendingWork {
            match output_rx.recv_timeout(self.poll_interval) {
                Ok(item) => forwarded += self.forward(item),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => state = RunState::Draining,
            }
            for item in output_rx.try_iter() {
                forwarded += self.forward(item);
            }
            if let Some(path) = progress_rx.try_iter().last() {
                latest = Some(path);
            }
            if last_emit.is_none_or(|t| t.elapsed() >= self.poll_interval)
                && let Some(path) = latest.take()
            {
                let status = ScanStatus::new(total, input_rx.len(), Some(&path));
                self.progress.update(ScanConsts::PROGRESS_ID, &status);
                last_emit = Some(Instant::now());
            }
            if input_rx.is_empty() || cancel.load(Ordering::Acquire) {
                state = RunState::Draining;
            }
        }

        log::debug!("library {}: {:?}", library_id, state);
        workers_stop.store(true, Ordering::Release);
        let mut stats = WorkerStats::default();
        for handle in handles {
            match handle.join() {
                Ok(s) => stats += s,
                Err(_) => log::error!("library {}: file tester panicked", library_id),
            }
        }
        // Workers may have pushed after the last poll.
        for item in output_rx.try_iter() {
            forwarded += self.forward(item);
        }

        summary.tested = stats.tested;
        summary.forwarded = forwarded;
        summary.failed = stats.failed;
        summary.cancelled = cancel.load(Ordering::Acquire) && stats.tested < total;

        let last = if summary.cancelled {
            ScanStatus::stopped(total, input_rx.len())
        } else {
            ScanStatus::complete()
        };
        self.progress.update(ScanConsts::PROGRESS_ID, &last);
        self.progress.remove(ScanConsts::PROGRESS_ID);
        state = RunState::Done;
        log::debug!("library {}: {:?} {:?}", library_id, state, summary);
        log::info!(
            "Library {}: tested {} of {} file(s), {} forwarded, {} failed",
            library_id,
            summary.tested,
            summary.total,
            summary.forwarded,
            summary.failed
        );
        Ok(summary)
    }

    fn forward(&self, item: ScanItem) -> usize {
        let path = item.path.clone();
        match self.queue.enqueue(item) {
            Ok(()) => 1,
            Err(err) => {
                log::error!("Could not forward {}: {:#}", path.display(), err);
                0
            }
        }
    }
}
