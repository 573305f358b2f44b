//! Downstream task queue: where forwarded scan items go.

use anyhow::{Result, anyhow};
use crossbeam_channel::{Receiver, Sender, unbounded};
use std::io::Write;

use crate::types::ScanItem;

/// Accepts work for the host orchestrator. Must return promptly; ordering is the queue's business.
pub trait TaskQueue: Send + Sync {
    fn enqueue(&self, item: ScanItem) -> Result<()>;
}

/// In-process queue backed by a channel; the receiver belongs to the consumer.
#[derive(Clone)]
pub struct ChannelTaskQueue {
    tx: Sender<ScanItem>,
}

impl ChannelTaskQueue {
    pub fn new() -> (Self, Receiver<ScanItem>) {
        let (tx, rx) = unbounded();
        (Self { tx }, rx)
    }
}

impl TaskQueue for ChannelTaskQueue {
    fn enqueue(&self, item: ScanItem) -> Result<()> {
        self.tx
            .send(item)
            .map_err(|e| anyhow!("task queue closed, dropped {}", e.0.path.display()))
    }
}

/// Writes each item as one JSON line on stdout (CLI consumer).
pub struct JsonLinesQueue;

impl TaskQueue for JsonLinesQueue {
    fn enqueue(&self, item: ScanItem) -> Result<()> {
        let line = serde_json::to_string(&item)?;
        let mut out = std::io::stdout().lock();
        writeln!(out, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn closed_channel_reports_error() {
        let (queue, rx) = ChannelTaskQueue::new();
        drop(rx);
        let item = ScanItem {
            library_id: 1,
            path: PathBuf::from("/media/a.mkv"),
            priority_score: None,
            shared_info: Default::default(),
        };
        assert!(queue.enqueue(item).is_err());
    }
}
