//! User progress counters and review records

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::card::{CardStats, LearningState};
use crate::rating::ReviewRating;

/// Aggregate answer counters for one user
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProgress {
    pub user_id: String,
    pub total_answered: u32,
    pub total_correct: u32,
    pub current_streak: u32,
    pub best_streak: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UserProgress {
    /// Counters for a user who has never answered
    pub fn empty(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            total_answered: 0,
            total_correct: 0,
            current_streak: 0,
            best_streak: 0,
            updated_at: None,
        }
    }

    /// Count one answer
    pub fn record(&mut self, is_correct: bool, now: DateTime<Utc>) {
        self.total_answered += 1;
        if is_correct {
            self.total_correct += 1;
            self.current_streak += 1;
            self.best_streak = self.best_streak.max(self.current_streak);
        } else {
            self.current_streak = 0;
        }
        self.updated_at = Some(now);
    }

    /// Percentage of correct answers, rounded to 2 decimals
    pub fn accuracy(&self) -> f64 {
        if self.total_answered == 0 {
            return 0.0;
        }
        let pct = f64::from(self.total_correct) / f64::from(self.total_answered) * 100.0;
        (pct * 100.0).round() / 100.0
    }
}

/// One answered presentation, kept for analytics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewRecord {
    pub user_id: String,
    pub item_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub answer: Vec<usize>,
    pub is_correct: bool,
    pub response_time_secs: f64,
    pub rating: ReviewRating,
    pub state_before: LearningState,
    pub elapsed_days: u32,
    pub scheduled_days: u32,
    pub reviewed_at: DateTime<Utc>,
}

/// Distinct items answered within one topic
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopicProgress {
    pub topic: String,
    pub items_answered: i64,
}

/// Everything the learner dashboard shows
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressSummary {
    pub user_id: String,
    pub total_answered: u32,
    pub total_correct: u32,
    pub accuracy: f64,
    pub current_streak: u32,
    pub best_streak: u32,
    pub topics: Vec<TopicProgress>,
    pub cards: CardStats,
}
