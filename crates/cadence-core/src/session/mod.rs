//! Review Sessions
//!
//! A session is one bounded run of item presentations for a user:
//! `Building -> Active -> Completed`. Items move from `available_items` to
//! `used_items` exactly once, so nothing repeats within a session. Initial
//! sessions also skip every item the user has already seen.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::card::{CardState, LearningState};
use crate::catalog::{Item, ItemView};
use crate::error::{CoreError, Result};
use crate::progress::ReviewRecord;
use crate::rating::ReviewRating;
use crate::scheduler::{PerformanceSignals, ReviewInput, SchedulerEngine};
use crate::selection::DueSetSelector;
use crate::storage::Storage;

/// Items per session when the caller does not say
pub const DEFAULT_SESSION_SIZE: usize = 10;
/// Upper bound on items per session
pub const MAX_SESSION_SIZE: usize = 100;
/// Upper bound on topics per session
pub const MAX_TOPICS: usize = 10;

// ============================================================================
// SESSION RECORD
// ============================================================================

/// How the candidate pool is built
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    /// Any catalog item in the topics
    #[default]
    Practice,
    /// Only items the user has never been shown
    Initial,
    /// Only due cards in the Review state
    Review,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Practice => "practice",
            SessionKind::Initial => "initial",
            SessionKind::Review => "review",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "practice" => Some(SessionKind::Practice),
            "initial" => Some(SessionKind::Initial),
            "review" => Some(SessionKind::Review),
            _ => None,
        }
    }
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Session lifecycle phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionPhase {
    Building,
    Active,
    Completed,
}

impl SessionPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionPhase::Building => "building",
            SessionPhase::Active => "active",
            SessionPhase::Completed => "completed",
        }
    }

    pub fn parse_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "building" => Some(SessionPhase::Building),
            "active" => Some(SessionPhase::Active),
            "completed" => Some(SessionPhase::Completed),
            _ => None,
        }
    }
}

/// Persisted session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub session_id: String,
    pub user_id: String,
    pub selected_topics: Vec<String>,
    pub kind: SessionKind,
    /// Not yet presented, in presentation order
    pub available_items: Vec<String>,
    /// Already presented, in presentation order
    pub used_items: Vec<String>,
    pub phase: SessionPhase,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    fn building(user_id: &str, topics: Vec<String>, kind: SessionKind, now: DateTime<Utc>) -> Self {
        Self {
            session_id: uuid::Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            selected_topics: topics,
            kind,
            available_items: Vec::new(),
            used_items: Vec::new(),
            phase: SessionPhase::Building,
            created_at: now,
            updated_at: now,
        }
    }

    fn activate(&mut self, items: Vec<String>, now: DateTime<Utc>) {
        self.available_items = items;
        self.phase = SessionPhase::Active;
        self.updated_at = now;
    }

    /// Move the head of `available_items` to `used_items`
    fn take_next(&mut self, now: DateTime<Utc>) -> Option<String> {
        if self.available_items.is_empty() {
            return None;
        }
        let item_id = self.available_items.remove(0);
        self.used_items.push(item_id.clone());
        self.updated_at = now;
        Some(item_id)
    }

    fn complete(&mut self, now: DateTime<Utc>) {
        self.phase = SessionPhase::Completed;
        self.updated_at = now;
    }

    pub fn is_completed(&self) -> bool {
        self.phase == SessionPhase::Completed
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            user_id: self.user_id.clone(),
            topics: self.selected_topics.clone(),
            kind: self.kind,
            phase: self.phase,
            item_count: self.available_items.len() + self.used_items.len(),
            remaining: self.available_items.len(),
            created_at: self.created_at,
        }
    }
}

// ============================================================================
// OPERATION RESULTS
// ============================================================================

/// Public view of a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSummary {
    pub session_id: String,
    pub user_id: String,
    pub topics: Vec<String>,
    pub kind: SessionKind,
    pub phase: SessionPhase,
    pub item_count: usize,
    pub remaining: usize,
    pub created_at: DateTime<Utc>,
}

/// Result of starting a session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum StartOutcome {
    Started(SessionSummary),
    /// Nothing in the catalog matched the requested topics
    #[serde(rename_all = "camelCase")]
    NoItemsAvailable {
        requested_topics: Vec<String>,
        available_topics: Vec<String>,
    },
}

/// Result of asking for the next item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "status")]
pub enum NextItem {
    #[serde(rename_all = "camelCase")]
    Presented {
        item: ItemView,
        /// The user had reviewed this item before
        is_review: bool,
        /// 1-based position within the session
        position: usize,
        remaining: usize,
    },
    #[serde(rename_all = "camelCase")]
    Completed { items_presented: usize },
}

/// An answer to one presented item
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub item_id: String,
    /// Selected option indices
    pub answer: Vec<i64>,
    pub response_time_secs: f64,
}

/// Scheduling-relevant view of a card after a review
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CardSummary {
    pub state: LearningState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
    pub stability: f64,
    pub difficulty: f64,
    pub due_date: DateTime<Utc>,
    pub reps: u32,
    pub lapses: u32,
}

impl From<&CardState> for CardSummary {
    fn from(card: &CardState) -> Self {
        Self {
            state: card.state,
            step: card.step,
            stability: card.stability,
            difficulty: card.difficulty,
            due_date: card.due_date,
            reps: card.reps,
            lapses: card.lapses,
        }
    }
}

/// Result of an answer submission
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResult {
    pub is_correct: bool,
    pub correct_indices: Vec<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,
    pub rating: ReviewRating,
    pub card: CardSummary,
    pub current_streak: u32,
}

// ============================================================================
// HELPERS
// ============================================================================

/// Lower-case, trim and de-duplicate topics, keeping first-seen order
pub fn normalize_topics(topics: &[String]) -> Result<Vec<String>> {
    let mut seen = HashSet::new();
    let normalized: Vec<String> = topics
        .iter()
        .map(|t| t.trim().to_lowercase())
        .filter(|t| !t.is_empty())
        .filter(|t| seen.insert(t.clone()))
        .collect();

    if normalized.is_empty() {
        return Err(CoreError::InvalidInput("at least one topic is required".to_string()));
    }
    if normalized.len() > MAX_TOPICS {
        return Err(CoreError::InvalidInput(format!(
            "at most {} topics per session, got {}",
            MAX_TOPICS,
            normalized.len()
        )));
    }
    Ok(normalized)
}

fn validate_index(index: i64, option_count: usize) -> Result<usize> {
    if index < 0 || index as usize >= option_count {
        return Err(CoreError::OutOfRange { index, option_count });
    }
    Ok(index as usize)
}

// ============================================================================
// SESSION MANAGER
// ============================================================================

/// Owns session lifecycles
pub struct SessionManager {
    storage: Arc<Storage>,
    engine: Arc<SchedulerEngine>,
    selector: Arc<DueSetSelector>,
}

impl SessionManager {
    pub fn new(engine: Arc<SchedulerEngine>, selector: Arc<DueSetSelector>) -> Self {
        Self {
            storage: Arc::clone(engine.storage()),
            engine,
            selector,
        }
    }

    /// Load a session or fail with `NotFound`
    pub fn get(&self, session_id: &str) -> Result<Session> {
        self.storage
            .get_session(session_id)?
            .ok_or_else(|| CoreError::NotFound(format!("session {}", session_id)))
    }

    /// Exact topic match, falling back to substring match when nothing matches
    fn practice_pool(&self, topics: &[String]) -> Result<Vec<Item>> {
        let exact = self.storage.items_by_topics(topics)?;
        if !exact.is_empty() {
            return Ok(exact);
        }
        let fuzzy = self.storage.items_by_topic_substring(topics)?;
        if !fuzzy.is_empty() {
            tracing::debug!("No exact topic match for {:?}, using {} substring matches", topics, fuzzy.len());
        }
        Ok(fuzzy)
    }

    fn candidate_pool(
        &self,
        user_id: &str,
        topics: &[String],
        kind: SessionKind,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<String>> {
        match kind {
            SessionKind::Practice => Ok(self
                .practice_pool(topics)?
                .into_iter()
                .map(|item| item.id)
                .collect()),
            SessionKind::Initial => {
                let seen = self.storage.card_item_ids(user_id)?;
                Ok(self
                    .practice_pool(topics)?
                    .into_iter()
                    .map(|item| item.id)
                    .filter(|id| !seen.contains(id))
                    .collect())
            }
            SessionKind::Review => Ok(self
                .selector
                .select(user_id, Some(topics), limit, false, now)?
                .into_iter()
                .map(|due| due.item_id)
                .collect()),
        }
    }

    /// Start a session with the thread-local RNG
    pub fn start(
        &self,
        user_id: &str,
        topics: &[String],
        kind: SessionKind,
        limit: Option<usize>,
        now: DateTime<Utc>,
    ) -> Result<StartOutcome> {
        self.start_with_rng(user_id, topics, kind, limit, now, &mut rand::thread_rng())
    }

    /// Start a session, sampling practice items with `rng`
    pub fn start_with_rng<R: Rng + ?Sized>(
        &self,
        user_id: &str,
        topics: &[String],
        kind: SessionKind,
        limit: Option<usize>,
        now: DateTime<Utc>,
        rng: &mut R,
    ) -> Result<StartOutcome> {
        if user_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("user id is required".to_string()));
        }
        let topics = normalize_topics(topics)?;
        let limit = match limit.unwrap_or(DEFAULT_SESSION_SIZE) {
            0 => {
                return Err(CoreError::InvalidInput(
                    "session size must be positive".to_string(),
                ))
            }
            n => n.min(MAX_SESSION_SIZE),
        };

        let mut session = Session::building(user_id, topics, kind, now);
        let mut pool = self.candidate_pool(user_id, &session.selected_topics, kind, limit, now)?;

        if pool.is_empty() {
            tracing::info!(
                "No {} items for {} in topics {:?}",
                kind,
                user_id,
                session.selected_topics
            );
            return Ok(StartOutcome::NoItemsAvailable {
                requested_topics: session.selected_topics,
                available_topics: self.storage.distinct_topics()?,
            });
        }

        if kind != SessionKind::Review && pool.len() > limit {
            pool.shuffle(rng);
            pool.truncate(limit);
        }

        session.activate(pool, now);
        self.storage.insert_session(&session)?;

        tracing::info!(
            "Started {} session {} for {} with {} items",
            kind,
            session.session_id,
            user_id,
            session.available_items.len()
        );

        Ok(StartOutcome::Started(session.summary()))
    }

    /// Present the next item, or report completion
    pub fn next(&self, session_id: &str, now: DateTime<Utc>) -> Result<NextItem> {
        let mut session = self.get(session_id)?;

        if !session.is_completed() {
            while let Some(item_id) = session.take_next(now) {
                let Some(item) = self.storage.get_item(&item_id)? else {
                    tracing::warn!("Item {} left the catalog, skipping in session {}", item_id, session_id);
                    session.used_items.pop();
                    continue;
                };

                let card = self.storage.get_or_create_card(&session.user_id, &item_id, now)?;
                self.storage.update_session(&session)?;

                return Ok(NextItem::Presented {
                    item: ItemView::from(&item),
                    is_review: !card.is_unreviewed(),
                    position: session.used_items.len(),
                    remaining: session.available_items.len(),
                });
            }

            session.complete(now);
            self.storage.update_session(&session)?;
            tracing::info!(
                "Session {} completed after {} items",
                session_id,
                session.used_items.len()
            );
        }

        Ok(NextItem::Completed {
            items_presented: session.used_items.len(),
        })
    }

    /// Grade an answer, then review the card, update the user's counters and
    /// log the review in one transaction
    pub fn submit(
        &self,
        session_id: &str,
        submission: &Submission,
        now: DateTime<Utc>,
    ) -> Result<SubmitResult> {
        let session = self.get(session_id)?;
        let item = self
            .storage
            .get_item(&submission.item_id)?
            .ok_or_else(|| CoreError::NotFound(format!("item {}", submission.item_id)))?;

        if !submission.response_time_secs.is_finite() {
            return Err(CoreError::InvalidInput(
                "response time must be a finite number of seconds".to_string(),
            ));
        }

        let option_count = item.option_count();
        let answer = submission
            .answer
            .iter()
            .map(|&i| validate_index(i, option_count))
            .collect::<Result<HashSet<usize>>>()?;
        let correct = item
            .correct_indices
            .iter()
            .map(|&i| validate_index(i as i64, option_count))
            .collect::<Result<HashSet<usize>>>()?;
        if correct.is_empty() {
            return Err(CoreError::InvalidInput(format!(
                "item {} has no correct answer",
                item.id
            )));
        }
        let is_correct = answer == correct;

        let mut submitted: Vec<usize> = answer.into_iter().collect();
        submitted.sort_unstable();

        let streak = self.storage.get_progress(&session.user_id)?.current_streak;
        let (outcome, progress) = self.engine.review_with(
            &session.user_id,
            &item.id,
            ReviewInput::Performance(PerformanceSignals {
                is_correct,
                response_time_secs: submission.response_time_secs,
                consecutive_correct: streak,
            }),
            now,
            |outcome, expected_version| {
                let record = ReviewRecord {
                    user_id: session.user_id.clone(),
                    item_id: item.id.clone(),
                    session_id: Some(session.session_id.clone()),
                    answer: submitted.clone(),
                    is_correct,
                    response_time_secs: submission.response_time_secs.max(0.0),
                    rating: outcome.rating,
                    state_before: outcome.log.state,
                    elapsed_days: outcome.log.elapsed_days,
                    scheduled_days: outcome.log.scheduled_days,
                    reviewed_at: now,
                };
                Ok(self.storage.commit_answer(&outcome.card, expected_version, &record)?)
            },
        )?;

        tracing::debug!(
            "Session {}: {} answered {} ({}), rated {}",
            session_id,
            session.user_id,
            item.id,
            if is_correct { "correct" } else { "incorrect" },
            outcome.rating
        );

        Ok(SubmitResult {
            is_correct,
            correct_indices: item.correct_indices.clone(),
            explanation: item.explanation.clone(),
            rating: outcome.rating,
            card: CardSummary::from(&outcome.card),
            current_streak: progress.current_streak,
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
