//! Scheduler Engine
//!
//! One review event end to end: resolve the rating, fetch or create the card,
//! ask the memory scheduler for the next state, merge it, and persist with an
//! optimistic version check. A lost race re-reads the card and recomputes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::memory::{MemoryScheduler, ReviewLog};
use crate::card::{CardState, LearningState};
use crate::catalog::Item;
use crate::error::{CoreError, Result};
use crate::rating::{self, ReviewRating};
use crate::storage::Storage;

/// Retries after the first attempt before a review gives up with `Conflict`
pub const DEFAULT_MAX_CONFLICT_RETRIES: u32 = 3;

/// Raw answer performance used to estimate a rating
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PerformanceSignals {
    pub is_correct: bool,
    pub response_time_secs: f64,
    pub consecutive_correct: u32,
}

/// Where the rating for a review comes from
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "type", content = "value")]
pub enum ReviewInput {
    /// Rating supplied by the caller (1-4)
    Explicit(i64),
    /// Estimate from performance; item difficulty comes from the catalog
    Performance(PerformanceSignals),
}

/// Result of a persisted review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewOutcome {
    pub rating: ReviewRating,
    pub card: CardState,
    pub log: ReviewLog,
}

/// What a rating would do to a card, without persisting anything
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchedulePreview {
    pub rating: ReviewRating,
    pub state: LearningState,
    pub due_date: DateTime<Utc>,
    pub scheduled_days: u32,
}

/// Orchestrates review events over [`Storage`] and a [`MemoryScheduler`]
pub struct SchedulerEngine {
    storage: Arc<Storage>,
    scheduler: Arc<dyn MemoryScheduler>,
    max_conflict_retries: u32,
}

impl SchedulerEngine {
    pub fn new(storage: Arc<Storage>, scheduler: Arc<dyn MemoryScheduler>) -> Self {
        Self {
            storage,
            scheduler,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }

    pub fn with_max_conflict_retries(mut self, retries: u32) -> Self {
        self.max_conflict_retries = retries;
        self
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn scheduler(&self) -> &Arc<dyn MemoryScheduler> {
        &self.scheduler
    }

    fn require_item(&self, item_id: &str) -> Result<Item> {
        self.storage
            .get_item(item_id)?
            .ok_or_else(|| CoreError::NotFound(format!("item {}", item_id)))
    }

    /// Resolve the rating for `input` against `item`
    pub fn resolve_rating(item: &Item, input: &ReviewInput) -> Result<ReviewRating> {
        match *input {
            ReviewInput::Explicit(value) => ReviewRating::try_from(value),
            ReviewInput::Performance(signals) => Ok(rating::estimate(
                signals.is_correct,
                signals.response_time_secs,
                item.difficulty,
                signals.consecutive_correct,
            )),
        }
    }

    /// Apply one review of `item_id` by `user_id` at `now`.
    ///
    /// Every successful call adds exactly one rep. A scheduler failure leaves
    /// the stored card unchanged.
    pub fn review(
        &self,
        user_id: &str,
        item_id: &str,
        input: ReviewInput,
        now: DateTime<Utc>,
    ) -> Result<ReviewOutcome> {
        let (outcome, ()) = self.review_with(user_id, item_id, input, now, |outcome, expected_version| {
            Ok(self.storage.update_card(&outcome.card, expected_version)?.then_some(()))
        })?;
        Ok(outcome)
    }

    /// Same as [`review`](Self::review), but the write is delegated to `commit`.
    ///
    /// `commit` receives the outcome (merged card, rating and scheduler log)
    /// and the version the card must still have in storage. It returns `None`
    /// when the version check lost a race, which re-reads the card and
    /// recomputes.
    pub fn review_with<T, F>(
        &self,
        user_id: &str,
        item_id: &str,
        input: ReviewInput,
        now: DateTime<Utc>,
        mut commit: F,
    ) -> Result<(ReviewOutcome, T)>
    where
        F: FnMut(&ReviewOutcome, i64) -> Result<Option<T>>,
    {
        let item = self.require_item(item_id)?;
        let rating = Self::resolve_rating(&item, &input)?;

        for attempt in 0..=self.max_conflict_retries {
            let card = self.storage.get_or_create_card(user_id, item_id, now)?;
            let expected_version = card.version;

            let (memory, log) = self.scheduler.review(&card.memory_state(), rating, now)?;
            let mut outcome = ReviewOutcome { rating, card, log };
            outcome.card.apply_scheduler_result(&memory, rating, now);

            if let Some(committed) = commit(&outcome, expected_version)? {
                outcome.card.version = expected_version + 1;
                tracing::debug!(
                    "Reviewed {}/{} as {}: {} -> {}, due {}",
                    user_id,
                    item_id,
                    rating,
                    outcome.log.state,
                    outcome.card.state,
                    outcome.card.due_date
                );
                return Ok((outcome, committed));
            }

            tracing::warn!(
                "Card {}/{} changed during review (attempt {}), retrying",
                user_id,
                item_id,
                attempt + 1
            );
        }

        Err(CoreError::Conflict(format!("card {}/{}", user_id, item_id)))
    }

    /// Probability of recall at `now`; `None` when the user has no card
    pub fn retrievability(
        &self,
        user_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<f64>> {
        Ok(self
            .storage
            .get_card(user_id, item_id)?
            .map(|card| self.scheduler.retrievability(&card.memory_state(), now)))
    }

    /// Outcome of each rating at `now`, computed without writing
    pub fn preview(
        &self,
        user_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<Vec<SchedulePreview>> {
        self.require_item(item_id)?;
        let card = self
            .storage
            .get_card(user_id, item_id)?
            .unwrap_or_else(|| CardState::new(user_id, item_id, now));

        ReviewRating::ALL
            .iter()
            .map(|&rating| {
                let (memory, _) = self.scheduler.review(&card.memory_state(), rating, now)?;
                let mut next = card.clone();
                next.apply_scheduler_result(&memory, rating, now);
                Ok(SchedulePreview {
                    rating,
                    state: next.state,
                    due_date: next.due_date,
                    scheduled_days: next.scheduled_days,
                })
            })
            .collect()
    }

    /// Reinitialize the memory model of an existing card
    pub fn reset(&self, user_id: &str, item_id: &str, now: DateTime<Utc>) -> Result<CardState> {
        for _ in 0..=self.max_conflict_retries {
            let mut card = self
                .storage
                .get_card(user_id, item_id)?
                .ok_or_else(|| CoreError::NotFound(format!("card {}/{}", user_id, item_id)))?;
            let expected_version = card.version;
            card.reset(now);

            if self.storage.update_card(&card, expected_version)? {
                card.version = expected_version + 1;
                tracing::info!("Reset card {}/{}", user_id, item_id);
                return Ok(card);
            }
        }

        Err(CoreError::Conflict(format!("card {}/{}", user_id, item_id)))
    }
}

// ============================================================================
// TESTS
// ============================================================================
