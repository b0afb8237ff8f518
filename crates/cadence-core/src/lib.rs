//! # Cadence Core
//!
//! Adaptive review scheduling for multiple-choice learning items:
//!
//! - **Rating estimation**: correctness, response time, item difficulty and
//!   streak folded into an Again/Hard/Good/Easy rating
//! - **Card lifecycle**: one memory record per (user, item), lazily created,
//!   advanced by an external forgetting-curve model (FSRS via `rs-fsrs`)
//! - **Due-set selection**: what is due now, oldest first, optionally per topic
//! - **Sessions**: bounded runs of presentations with no repeats
//! - **SQLite storage**: migrations, legacy record normalization, uniqueness
//!   and optimistic-version guards
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use cadence_core::{Config, NextItem, ReviewService, SessionKind, StartOutcome};
//!
//! let service = ReviewService::from_config(&Config::from_env())?;
//! service.import_items(&std::fs::read_to_string("items.json")?)?;
//!
//! if let StartOutcome::Started(session) =
//!     service.start_session("learner-1", &["algebra".into()], SessionKind::Practice, None)?
//! {
//!     while let NextItem::Presented { item, .. } = service.next_item(&session.session_id)? {
//!         let result = service.submit_answer(&session.session_id, &item.id, vec![0], 12.5)?;
//!         println!("{} -> {}", item.id, result.rating);
//!     }
//! }
//! ```

#![warn(rustdoc::missing_crate_level_docs)]

// ============================================================================
// MODULES
// ============================================================================

pub mod card;
pub mod catalog;
pub mod config;
pub mod error;
pub mod progress;
pub mod rating;
pub mod scheduler;
pub mod selection;
pub mod service;
pub mod session;
pub mod storage;

// ============================================================================
// PUBLIC API RE-EXPORTS
// ============================================================================

pub use card::{CardState, CardStats, LearningState, StateStats};
pub use catalog::{ImportReport, Item, ItemView};
pub use config::Config;
pub use error::{CoreError, ErrorKind, Result};
pub use progress::{ProgressSummary, ReviewRecord, TopicProgress, UserProgress};
pub use rating::{estimate, ReviewRating};
pub use scheduler::{
    FsrsMemoryScheduler, FsrsSettings, MemoryScheduler, MemoryState, PerformanceSignals,
    ReviewInput, ReviewLog, ReviewOutcome, SchedulePreview, SchedulerEngine, SchedulerError,
};
pub use selection::{CardContext, DueCount, DueItem, DueSetSelector};
pub use service::ReviewService;
pub use session::{
    CardSummary, NextItem, Session, SessionKind, SessionManager, SessionPhase, SessionSummary,
    StartOutcome, Submission, SubmitResult,
};
pub use storage::{Storage, StorageError};

// ============================================================================
// VERSION INFO
// ============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
