//! Card State - the per-(user, item) memory record
//!
//! A card is created lazily the first time an item is presented to a user and
//! is only ever mutated by a review event or an explicit reset. It carries:
//! - the learning state machine (Learning / Review / Relearning)
//! - step bookkeeping for the learning phases
//! - the memory model (stability, difficulty)
//! - scheduling (due date, last review)
//! - an optimistic-concurrency version

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::rating::ReviewRating;
use crate::scheduler::MemoryState;

/// Stability/difficulty used for fresh cards and for corrupt (non-positive) values
pub const DEFAULT_STABILITY: f64 = 2.5;
pub const DEFAULT_DIFFICULTY: f64 = 2.5;

// ============================================================================
// LEARNING STATE
// ============================================================================

/// Position in the card lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LearningState {
    /// No record exists yet (never persisted)
    New,
    /// First-pass learning
    #[default]
    Learning,
    /// Graduated to interval reviews
    Review,
    /// Lapsed from review, relearning
    Relearning,
}

impl LearningState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LearningState::New => "new",
            LearningState::Learning => "learning",
            LearningState::Review => "review",
            LearningState::Relearning => "relearning",
        }
    }

    /// Parse from string name
    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "new" | "0" => Some(LearningState::New),
            "learning" | "1" => Some(LearningState::Learning),
            "review" | "2" => Some(LearningState::Review),
            "relearning" | "3" => Some(LearningState::Relearning),
            _ => None,
        }
    }

    /// Learning and Relearning track a step; Review does not
    pub fn has_step(&self) -> bool {
        matches!(self, LearningState::Learning | LearningState::Relearning)
    }
}

impl std::fmt::Display for LearningState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ============================================================================
// CARD STATE
// ============================================================================

/// Memory record for one user and one item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardState {
    pub user_id: String,
    pub item_id: String,
    pub state: LearningState,
    /// Present iff `state` is Learning or Relearning
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub stability: f64,
    pub difficulty: f64,
    pub elapsed_days: u32,
    pub scheduled_days: u32,
    pub reps: u32,
    pub lapses: u32,
    pub due_date: DateTime<Utc>,
    /// Absent iff the card has never been reviewed
    pub last_review: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Incremented by every persisted mutation
    pub version: i64,
}

impl CardState {
    /// Fresh card, due immediately
    pub fn new(user_id: impl Into<String>, item_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.into(),
            item_id: item_id.into(),
            state: LearningState::Learning,
            step: Some(0),
            stability: DEFAULT_STABILITY,
            difficulty: DEFAULT_DIFFICULTY,
            elapsed_days: 0,
            scheduled_days: 0,
            reps: 0,
            lapses: 0,
            due_date: now,
            last_review: None,
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    /// Repair values that violate the record invariants.
    ///
    /// Applied to every record read from the store and after every merge.
    pub fn normalized(mut self) -> Self {
        if !self.stability.is_finite() || self.stability <= 0.0 {
            self.stability = DEFAULT_STABILITY;
        }
        if !self.difficulty.is_finite() || self.difficulty <= 0.0 {
            self.difficulty = DEFAULT_DIFFICULTY;
        }
        if self.state == LearningState::New {
            self.state = LearningState::Learning;
        }
        self.step = resolve_step(self.state, self.step);
        self
    }

    /// Whether the card is due at `now`
    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        self.due_date <= now
    }

    /// Whether the card has never been reviewed
    pub fn is_unreviewed(&self) -> bool {
        self.last_review.is_none()
    }

    /// Snapshot handed to the memory scheduler.
    ///
    /// A card that has never been reviewed is presented as `New` so the
    /// scheduler applies its first-review initialization.
    pub fn memory_state(&self) -> MemoryState {
        MemoryState {
            state: if self.is_unreviewed() {
                LearningState::New
            } else {
                self.state
            },
            step: self.step,
            stability: self.stability,
            difficulty: self.difficulty,
            elapsed_days: self.elapsed_days,
            scheduled_days: self.scheduled_days,
            reps: self.reps,
            lapses: self.lapses,
            due: self.due_date,
            last_review: self.last_review,
        }
    }

    /// Merge the memory scheduler's output for a review at `now`.
    pub fn apply_scheduler_result(
        &mut self,
        updated: &MemoryState,
        rating: ReviewRating,
        now: DateTime<Utc>,
    ) {
        let previous_review = self.last_review;

        self.stability = updated.stability;
        self.difficulty = updated.difficulty;
        self.state = match updated.state {
            LearningState::New => LearningState::Learning,
            other => other,
        };
        self.due_date = updated.due;
        self.last_review = updated.last_review.or(Some(now));

        self.reps += 1;
        if rating.is_lapse() {
            self.lapses += 1;
        }

        self.elapsed_days = previous_review
            .map(|prev| whole_days(prev, now))
            .unwrap_or(0);
        self.scheduled_days = whole_days(now, self.due_date);

        self.step = resolve_step(self.state, updated.step);
        self.updated_at = now;

        *self = self.clone().normalized();
    }

    /// Reinitialize the memory model in place, keeping review history counts.
    pub fn reset(&mut self, now: DateTime<Utc>) {
        self.state = LearningState::Learning;
        self.step = Some(0);
        self.stability = DEFAULT_STABILITY;
        self.difficulty = DEFAULT_DIFFICULTY;
        self.elapsed_days = 0;
        self.scheduled_days = 0;
        self.due_date = now;
        self.updated_at = now;
    }
}

/// Step consistent with `state`: kept (or 0) for the learning phases, absent for Review
fn resolve_step(state: LearningState, step: Option<u32>) -> Option<u32> {
    if state.has_step() {
        Some(step.unwrap_or(0))
    } else {
        None
    }
}

/// Whole days from `from` to `to`, never negative
fn whole_days(from: DateTime<Utc>, to: DateTime<Utc>) -> u32 {
    (to - from).num_days().max(0) as u32
}

// ============================================================================
// AGGREGATES
// ============================================================================

/// Per-state aggregate within [`CardStats`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StateStats {
    pub state: LearningState,
    pub count: i64,
    pub avg_stability: f64,
    pub avg_difficulty: f64,
}

/// Card statistics for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardStats {
    pub total_cards: i64,
    pub total_reps: i64,
    pub total_lapses: i64,
    /// (reps - lapses) / reps, 0 when nothing has been reviewed
    pub retention_rate: f64,
    pub by_state: Vec<StateStats>,
}

impl CardStats {
    pub fn from_states(by_state: Vec<StateStats>, total_reps: i64, total_lapses: i64) -> Self {
        let total_cards = by_state.iter().map(|s| s.count).sum();
        Self {
            total_cards,
            total_reps,
            total_lapses,
            retention_rate: retention_rate(total_reps, total_lapses),
            by_state,
        }
    }
}

/// (reps - lapses) / reps, 0 when `reps` is 0
pub fn retention_rate(total_reps: i64, total_lapses: i64) -> f64 {
    if total_reps <= 0 {
        return 0.0;
    }
    (total_reps - total_lapses) as f64 / total_reps as f64
}

// ============================================================================
// TESTS
// ============================================================================
