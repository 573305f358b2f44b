//! Non-blocking single-flight guard for process-wide batch jobs.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// One job of this kind at a time. A second caller is rejected, never queued.
#[derive(Clone, Debug)]
pub struct SingleFlight {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

/// Held for the whole job; releases the guard on drop, including on panic unwinding.
#[derive(Debug)]
pub struct FlightPermit {
    name: &'static str,
    busy: Arc<AtomicBool>,
}

impl SingleFlight {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            busy: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn is_busy(&self) -> bool {
        self.busy.load(Ordering::Acquire)
    }

    /// `None` if a job of this kind is already in flight.
    pub fn try_acquire(&self) -> Option<FlightPermit> {
        self.busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightPermit {
                name: self.name,
                busy: Arc::clone(&self.busy),
            })
    }
}

impl FlightPermit {
    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl Drop for FlightPermit {
    fn drop(&mut self) {
        self.busy.store(false, Ordering::Release);
        log::debug!("{} guard released", self.name);
    }
}
