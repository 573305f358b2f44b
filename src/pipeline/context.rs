//! Per-run queues and state shared by the coordinator and its worker threads.

use crossbeam_channel::{Receiver, Sender, unbounded};
use std::path::PathBuf;

use crate::types::ScanItem;

/// Lifecycle of one library run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RunState {
    /// Input queue still holds paths.
    PendingWork,
    /// Input exhausted or stop requested; workers are being joined.
    Draining,
    /// Workers joined and output fully forwarded.
    Done,
}

/// Channels of one run. The input queue is filled up front and its sender dropped, so an
/// empty input after the last pop also reads as disconnected for the workers.
pub struct RunChannels {
    pub input_rx: Receiver<PathBuf>,
    pub output_tx: Sender<ScanItem>,
    pub output_rx: Receiver<ScanItem>,
    pub progress_tx: Sender<PathBuf>,
    pub progress_rx: Receiver<PathBuf>,
    pub total: usize,
}

pub fn create_run_channels<I>(paths: I) -> RunChannels
where
    I: IntoIterator<Item = PathBuf>,
{
    let (input_tx, input_rx) = unbounded::<PathBuf>();
    let (output_tx, output_rx) = unbounded::<ScanItem>();
    let (progress_tx, progress_rx) = unbounded::<PathBuf>();
    let mut total = 0;
    for path in paths {
        // Receiver is alive in this scope; send cannot fail.
        if input_tx.send(path).is_ok() {
            total += 1;
        }
    }
    drop(input_tx);
    RunChannels {
        input_rx,
        output_tx,
        output_rx,
        progress_tx,
        progress_rx,
        total,
    }
}

impl RunChannels {
    pub fn remaining(&self) -> usize {
        self.input_rx.len()
    }
}
