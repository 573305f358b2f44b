//! Progress channels for scan runs: no-op, log lines, or a kdam terminal bar.

use kdam::{Animation, Bar, BarExt};
use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

/// Receives throttled status messages keyed by indicator id. Best-effort; never fails the run.
pub trait ProgressChannel: Send + Sync {
    fn update(&self, id: &str, status: &ScanStatus<'_>);
    /// Drop the transient indicator once the run is done.
    fn remove(&self, id: &str);
}

/// Snapshot of a run: whole-percent completion and the path being tested.
/// `stopped` marks the final status of a run cut short by a stop request.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScanStatus<'a> {
    pub percent: f64,
    pub current: Option<&'a Path>,
    pub stopped: bool,
}

impl<'a> ScanStatus<'a> {
    /// `(total - remaining) / total * 100`; an empty run counts as complete.
    pub fn new(total: usize, remaining: usize, current: Option<&'a Path>) -> Self {
        let percent = if total == 0 {
            100.0
        } else {
            total.saturating_sub(remaining) as f64 / total as f64 * 100.0
        };
        Self {
            percent,
            current,
            stopped: false,
        }
    }

    pub fn complete() -> Self {
        Self {
            percent: 100.0,
            current: None,
            stopped: false,
        }
    }

    /// Final status of a cancelled run; keeps the real percentage.
    pub fn stopped(total: usize, remaining: usize) -> Self {
        Self {
            stopped: true,
            ..Self::new(total, remaining, None)
        }
    }

    pub fn whole_percent(&self) -> usize {
        self.percent.round().clamp(0.0, 100.0) as usize
    }
}

impl fmt::Display for ScanStatus<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.current {
            Some(path) => write!(f, "{:.0}% - Testing: {}", self.percent, path.display()),
            None if self.stopped => write!(f, "{:.0}% - Testing stopped", self.percent),
            None => write!(f, "{:.0}% - Testing complete", self.percent),
        }
    }
}

pub struct NoopProgress;

impl ProgressChannel for NoopProgress {
    fn update(&self, _id: &str, _status: &ScanStatus<'_>) {}
    fn remove(&self, _id: &str) {}
}

/// Emits every status as an info log line.
pub struct LogProgress;

impl ProgressChannel for LogProgress {
    fn update(&self, id: &str, status: &ScanStatus<'_>) {
        log::info!("[{}] {}", id, status);
    }

    fn remove(&self, id: &str) {
        log::debug!("[{}] progress removed", id);
    }
}

// Progress bar type alias
pub type ProgressBar = Arc<Mutex<Bar>>;

/// Configuration for creating a progress bar
pub struct ProgressBarConfig {
    pub total: usize,
    pub desc: &'static str,
    pub animation: Animation,
}

impl ProgressBarConfig {
    pub fn new(total: usize, desc: &'static str, animation: Animation) -> Self {
        Self {
            total,
            desc,
            animation,
        }
    }
}

/// Create a progress bar with the given configuration
pub fn create_progress_bar(config: ProgressBarConfig) -> ProgressBar {
    Arc::new(Mutex::new(kdam::tqdm!(
        total = config.total,
        desc = config.desc,
        animation = config.animation
    )))
}

/// Percentage bar (total 100). The bar only moves forward; a new run restarts it.
pub struct KdamProgress {
    desc: &'static str,
    bar: ProgressBar,
    shown: Mutex<usize>,
}

impl KdamProgress {
    pub fn new(desc: &'static str) -> Self {
        Self {
            desc,
            bar: create_progress_bar(Self::config(desc)),
            shown: Mutex::new(0),
        }
    }

    fn config(desc: &'static str) -> ProgressBarConfig {
        ProgressBarConfig::new(100, desc, Animation::Classic)
    }
}

impl ProgressChannel for KdamProgress {
    fn update(&self, _id: &str, status: &ScanStatus<'_>) {
        let target = status.whole_percent();
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        if target > *shown {
            // Uses try_lock so a slow terminal never stalls the coordinator.
            if let Ok(mut bar) = self.bar.try_lock() {
                let _ = bar.update(target - *shown);
                *shown = target;
            }
        }
        if let Some(path) = status.current {
            log::debug!("Testing: {}", path.display());
        }
    }

    fn remove(&self, _id: &str) {
        let mut shown = self.shown.lock().unwrap_or_else(PoisonError::into_inner);
        if let Ok(mut bar) = self.bar.lock() {
            let _ = bar.refresh();
            eprintln!();
            let config = Self::config(self.desc);
            *bar = kdam::tqdm!(
                total = config.total,
                desc = config.desc,
                animation = config.animation
            );
        }
        *shown = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_formats_whole_percent_and_path() {
        let path = Path::new("/media/tv/a.mkv");
        let status = ScanStatus::new(3, 2, Some(path));
        assert_eq!(status.to_string(), "33% - Testing: /media/tv/a.mkv");
        assert_eq!(status.whole_percent(), 33);
    }

    #[test]
    fn empty_run_is_complete() {
        assert_eq!(ScanStatus::new(0, 0, None).whole_percent(), 100);
        assert_eq!(ScanStatus::complete().to_string(), "100% - Testing complete");
    }

    #[test]
    fn stopped_run_keeps_real_percent() {
        let status = ScanStatus::stopped(4, 3);
        assert!(status.stopped);
        assert_eq!(status.whole_percent(), 25);
        assert_eq!(status.to_string(), "25% - Testing stopped");
    }
}
