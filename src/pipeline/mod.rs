//! Scan pipeline: batch intake, per-library runs with a worker pool, downstream forwarding.

pub mod batch;
pub mod context;
pub mod guard;
pub mod orchestrator;
pub mod queue;
pub mod worker;

pub use batch::{ExpandedBatch, expand_batch, resolve_batch, validate_batch};
pub use context::{RunChannels, RunState, create_run_channels};
pub use guard::{FlightPermit, SingleFlight};
pub use orchestrator::{BatchStatus, ScanPipeline, ScanRunHandle};
pub use queue::{ChannelTaskQueue, JsonLinesQueue, TaskQueue};
pub use worker::{WorkerSetup, WorkerStats, spawn_file_testers};
