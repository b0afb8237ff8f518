//! Memory Scheduler seam
//!
//! The forgetting-curve model lives outside this crate. [`MemoryScheduler`] is
//! the contract the engine consumes; [`FsrsMemoryScheduler`] adapts the
//! `rs-fsrs` implementation to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::LearningState;
use crate::rating::ReviewRating;

// ============================================================================
// TYPES
// ============================================================================

/// Memory model snapshot exchanged with the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryState {
    pub state: LearningState,
    /// Learning step, when the scheduler tracks one
    pub step: Option<u32>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: u32,
    pub scheduled_days: u32,
    pub reps: u32,
    pub lapses: u32,
    pub due: DateTime<Utc>,
    pub last_review: Option<DateTime<Utc>>,
}

/// Record of a single review as seen by the scheduler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewLog {
    pub rating: ReviewRating,
    /// State before the review
    pub state: LearningState,
    pub elapsed_days: u32,
    pub scheduled_days: u32,
    pub reviewed_at: DateTime<Utc>,
}

/// Memory scheduler failure
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum SchedulerError {
    /// The scheduler produced no outcome for the requested rating
    #[error("No scheduling outcome for rating {0}")]
    MissingOutcome(ReviewRating),
    /// The scheduler produced an unusable memory state
    #[error("Invalid memory state: {0}")]
    InvalidState(String),
    /// Any other scheduler failure
    #[error("{0}")]
    Failed(String),
}

/// Forgetting-curve model consumed by the scheduling core.
///
/// Implementations must be pure: no persistence, no clock reads.
pub trait MemoryScheduler: Send + Sync {
    /// Apply one review at `now` and return the next memory state
    fn review(
        &self,
        memory: &MemoryState,
        rating: ReviewRating,
        now: DateTime<Utc>,
    ) -> Result<(MemoryState, ReviewLog), SchedulerError>;

    /// Probability of recall at `now` (0.0 - 1.0)
    fn retrievability(&self, memory: &MemoryState, now: DateTime<Utc>) -> f64;
}

// ============================================================================
// FSRS ADAPTER
// ============================================================================

/// Tunable parameters for the FSRS adapter
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsrsSettings {
    /// Target probability of recall at the due date
    pub request_retention: f64,
}

impl Default for FsrsSettings {
    fn default() -> Self {
        Self {
            request_retention: 0.9,
        }
    }
}

/// [`MemoryScheduler`] backed by `rs-fsrs`
pub struct FsrsMemoryScheduler {
    fsrs: rs_fsrs::FSRS,
    settings: FsrsSettings,
}

impl Default for FsrsMemoryScheduler {
    fn default() -> Self {
        Self::new(FsrsSettings::default())
    }
}

impl FsrsMemoryScheduler {
    pub fn new(settings: FsrsSettings) -> Self {
        let fsrs = rs_fsrs::FSRS::new(rs_fsrs::Parameters {
            request_retention: settings.request_retention.clamp(0.5, 0.99),
            ..Default::default()
        });
        Self { fsrs, settings }
    }

    pub fn settings(&self) -> FsrsSettings {
        self.settings
    }

    fn to_fsrs_card(memory: &MemoryState) -> rs_fsrs::Card {
        let mut card = rs_fsrs::Card::new();
        card.due = memory.due;
        card.stability = memory.stability;
        card.difficulty = memory.difficulty;
        card.elapsed_days = memory.elapsed_days as _;
        card.scheduled_days = memory.scheduled_days as _;
        card.reps = memory.reps as _;
        card.lapses = memory.lapses as _;
        card.state = to_fsrs_state(memory.state);
        if let Some(last_review) = memory.last_review {
            card.last_review = last_review;
        }
        card
    }

    fn from_fsrs_card(card: &rs_fsrs::Card) -> MemoryState {
        MemoryState {
            state: from_fsrs_state(card.state),
            step: None,
            stability: card.stability,
            difficulty: card.difficulty,
            elapsed_days: card.elapsed_days.max(0) as u32,
            scheduled_days: card.scheduled_days.max(0) as u32,
            reps: card.reps.max(0) as u32,
            lapses: card.lapses.max(0) as u32,
            due: card.due,
            last_review: Some(card.last_review),
        }
    }
}

fn to_fsrs_rating(rating: ReviewRating) -> rs_fsrs::Rating {
    match rating {
        ReviewRating::Again => rs_fsrs::Rating::Again,
        ReviewRating::Hard => rs_fsrs::Rating::Hard,
        ReviewRating::Good => rs_fsrs::Rating::Good,
        ReviewRating::Easy => rs_fsrs::Rating::Easy,
    }
}

fn to_fsrs_state(state: LearningState) -> rs_fsrs::State {
    match state {
        LearningState::New => rs_fsrs::State::New,
        LearningState::Learning => rs_fsrs::State::Learning,
        LearningState::Review => rs_fsrs::State::Review,
        LearningState::Relearning => rs_fsrs::State::Relearning,
    }
}

fn from_fsrs_state(state: rs_fsrs::State) -> LearningState {
    match state {
        rs_fsrs::State::New => LearningState::New,
        rs_fsrs::State::Learning => LearningState::Learning,
        rs_fsrs::State::Review => LearningState::Review,
        rs_fsrs::State::Relearning => LearningState::Relearning,
    }
}

impl MemoryScheduler for FsrsMemoryScheduler {
    fn review(
        &self,
        memory: &MemoryState,
        rating: ReviewRating,
        now: DateTime<Utc>,
    ) -> Result<(MemoryState, ReviewLog), SchedulerError> {
        let record_log = self.fsrs.repeat(Self::to_fsrs_card(memory), now);
        let info = record_log
            .get(&to_fsrs_rating(rating))
            .ok_or(SchedulerError::MissingOutcome(rating))?;

        let next = Self::from_fsrs_card(&info.card);
        if !next.stability.is_finite() || !next.difficulty.is_finite() {
            return Err(SchedulerError::InvalidState(format!(
                "stability={} difficulty={}",
                next.stability, next.difficulty
            )));
        }

        let log = ReviewLog {
            rating,
            state: memory.state,
            elapsed_days: memory
                .last_review
                .map(|last| (now - last).num_days().max(0) as u32)
                .unwrap_or(0),
            scheduled_days: next.scheduled_days,
            reviewed_at: now,
        };

        Ok((next, log))
    }

    fn retrievability(&self, memory: &MemoryState, now: DateTime<Utc>) -> f64 {
        if memory.last_review.is_none() {
            return 0.0;
        }
        Self::to_fsrs_card(memory)
            .get_retrievability(now)
            .clamp(0.0, 1.0)
    }
}

// ============================================================================
// TESTS
// ============================================================================
