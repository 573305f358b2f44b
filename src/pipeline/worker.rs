//! File tester workers: pop a path, run the analyzer, push forwarded items.

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crate::analyzer::Analyzer;
use crate::types::{LibraryId, ScanItem, Verdict};
use crate::utils::config::ScanConsts;

/// Per-worker counts, summed by the coordinator after join.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub tested: usize,
    pub forwarded: usize,
    pub failed: usize,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.tested += rhs.tested;
        self.forwarded += rhs.forwarded;
        self.failed += rhs.failed;
    }
}

/// What one worker needs; cloned per thread.
#[derive(Clone)]
pub struct WorkerSetup {
    pub library_id: LibraryId,
    pub analyzer: Arc<dyn Analyzer>,
    pub input_rx: Receiver<PathBuf>,
    pub output_tx: Sender<ScanItem>,
    pub progress_tx: Sender<PathBuf>,
    pub stop: Arc<AtomicBool>,
    pub poll_interval: Duration,
}

/// Stop is checked between items only; an item in progress always completes.
fn tester_loop(setup: WorkerSetup) -> WorkerStats {
    let mut stats = WorkerStats::default();
    let mut tester = match setup.analyzer.open_tester() {
        Ok(t) => t,
        Err(err) => {
            log::error!("File tester could not start: {:#}", err);
            return stats;
        }
    };
    while !setup.stop.load(Ordering::Acquire) {
        let path = match setup.input_rx.recv_timeout(setup.poll_interval) {
            Ok(path) => path,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => break,
        };
        let _ = setup.progress_tx.send(path.clone());
        stats.tested += 1;
        match tester.test(setup.library_id, &path) {
            Ok(Verdict::Skip) => {}
            Ok(Verdict::Forward {
                priority_score,
                shared_info,
            }) => {
                let item = ScanItem {
                    library_id: setup.library_id,
                    path,
                    priority_score,
                    shared_info,
                };
                if setup.output_tx.send(item).is_ok() {
                    stats.forwarded += 1;
                }
            }
            Err(err) => {
                stats.failed += 1;
                log::error!("Failed to test {}: {:#}", path.display(), err);
            }
        }
    }
    stats
}

/// Spawn `count` named tester threads. The caller drops its own output sender afterwards so
/// the output channel disconnects once every worker has exited.
pub fn spawn_file_testers(setup: &WorkerSetup, count: usize) -> Result<Vec<JoinHandle<WorkerStats>>> {
    (0..count)
        .map(|i| {
            let setup = setup.clone();
            thread::Builder::new()
                .name(format!(
                    "{}-{}-{}",
                    ScanConsts::WORKER_NAME_PREFIX,
                    setup.library_id,
                    i
                ))
                .spawn(move || tester_loop(setup))
                .context("spawn file tester")
        })
        .collect()
}
