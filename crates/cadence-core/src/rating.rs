//! Rating Estimation
//!
//! Turns raw answer performance into one of the four recall ratings fed to
//! the memory scheduler. The estimate is a pure function of:
//! - correctness (wrong answers are always `Again`)
//! - response time relative to an expected time for the item's difficulty
//! - the item's difficulty (harder items tolerate slower answers)
//! - the learner's current streak of correct answers

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

// ============================================================================
// REVIEW RATING
// ============================================================================

/// Recall quality reported to the memory scheduler
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReviewRating {
    /// Failed recall
    Again = 1,
    /// Recalled with serious difficulty
    Hard = 2,
    /// Recalled after some hesitation
    Good = 3,
    /// Recalled effortlessly
    Easy = 4,
}

impl ReviewRating {
    /// All ratings in ascending order
    pub const ALL: [ReviewRating; 4] = [
        ReviewRating::Again,
        ReviewRating::Hard,
        ReviewRating::Good,
        ReviewRating::Easy,
    ];

    /// Convert from the 1-4 integer form
    pub fn from_i64(value: i64) -> Option<Self> {
        match value {
            1 => Some(ReviewRating::Again),
            2 => Some(ReviewRating::Hard),
            3 => Some(ReviewRating::Good),
            4 => Some(ReviewRating::Easy),
            _ => None,
        }
    }

    /// Integer form (1-4)
    pub fn as_i64(&self) -> i64 {
        *self as i64
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ReviewRating::Again => "again",
            ReviewRating::Hard => "hard",
            ReviewRating::Good => "good",
            ReviewRating::Easy => "easy",
        }
    }

    /// Whether this rating counts as a lapse
    pub fn is_lapse(&self) -> bool {
        matches!(self, ReviewRating::Again)
    }
}

impl TryFrom<i64> for ReviewRating {
    type Error = CoreError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        Self::from_i64(value).ok_or(CoreError::InvalidRating(value))
    }
}

impl std::fmt::Display for ReviewRating {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for ReviewRating {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "again" | "1" => Ok(ReviewRating::Again),
            "hard" | "2" => Ok(ReviewRating::Hard),
            "good" | "3" => Ok(ReviewRating::Good),
            "easy" | "4" => Ok(ReviewRating::Easy),
            _ => Err(format!("Unknown rating: {}", s)),
        }
    }
}

// ============================================================================
// ESTIMATOR
// ============================================================================

/// Score at or below which a correct answer is `Easy`
pub const EASY_THRESHOLD: f64 = 0.6;
/// Score at or below which a correct answer is `Good`
pub const GOOD_THRESHOLD: f64 = 1.0;
/// Score at or below which a correct answer is `Hard`; above it is `Again`
pub const HARD_THRESHOLD: f64 = 1.5;

/// Streak discount per consecutive correct answer
const STREAK_STEP: f64 = 0.1;
/// Maximum streak discount
const STREAK_CAP: f64 = 0.3;

/// Expected answer time in seconds for a declared item difficulty (1-5).
///
/// Unknown difficulties fall back to the medium baseline.
pub fn expected_time_secs(item_difficulty: u8) -> f64 {
    match item_difficulty {
        1 => 10.0,
        2 => 20.0,
        3 => 30.0,
        4 => 45.0,
        5 => 60.0,
        _ => 30.0,
    }
}

/// Compute the raw performance score for a correct answer.
///
/// `final_score = time_factor * difficulty_multiplier * (1 - consistency_bonus)`
/// where lower is better.
pub fn score(response_time_secs: f64, item_difficulty: u8, consecutive_correct: u32) -> f64 {
    let expected = expected_time_secs(item_difficulty).max(1.0);
    // NaN.max(0.0) is 0.0
    let observed = response_time_secs.max(0.0);

    let time_factor = observed / expected;
    let difficulty_multiplier = 1.0 + (f64::from(item_difficulty) - 3.0) * 0.2;
    let consistency_bonus = (f64::from(consecutive_correct) * STREAK_STEP).min(STREAK_CAP);

    time_factor * difficulty_multiplier * (1.0 - consistency_bonus)
}

/// Estimate a review rating from answer performance.
///
/// Incorrect answers never receive partial credit. A correct answer that is
/// far slower than expected also maps to `Again`.
pub fn estimate(
    is_correct: bool,
    response_time_secs: f64,
    item_difficulty: u8,
    consecutive_correct: u32,
) -> ReviewRating {
    if !is_correct {
        return ReviewRating::Again;
    }

    let final_score = score(response_time_secs, item_difficulty, consecutive_correct);

    if final_score <= EASY_THRESHOLD {
        ReviewRating::Easy
    } else if final_score <= GOOD_THRESHOLD {
        ReviewRating::Good
    } else if final_score <= HARD_THRESHOLD {
        ReviewRating::Hard
    } else {
        ReviewRating::Again
    }
}

// ============================================================================
// TESTS
// ============================================================================
