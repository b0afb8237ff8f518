//! Scheduling
//!
//! - [`MemoryScheduler`]: the forgetting-curve seam and its FSRS adapter
//! - [`SchedulerEngine`]: review orchestration over storage and the scheduler

mod engine;
mod memory;

pub use engine::{
    PerformanceSignals, ReviewInput, ReviewOutcome, SchedulePreview, SchedulerEngine,
    DEFAULT_MAX_CONFLICT_RETRIES,
};
pub use memory::{
    FsrsMemoryScheduler, FsrsSettings, MemoryScheduler, MemoryState, ReviewLog, SchedulerError,
};
