//! Test Database Manager
//!
//! Isolated stores wired with the real FSRS scheduler:
//! - Temporary databases cleaned up on drop
//! - Seeding helpers for catalogs and reviewed cards
//! - Session drivers that answer with an explicit clock
//! - Reopening the same file to check persistence

use std::path::PathBuf;
use std::sync::Arc;

use cadence_core::{
    CardState, DueSetSelector, FsrsMemoryScheduler, NextItem, ReviewInput, ReviewRating,
    SchedulerEngine, SessionKind, SessionManager, SessionSummary, StartOutcome, Storage,
    Submission, SubmitResult,
};
use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tempfile::TempDir;

use crate::mocks::fixtures::TestDataFactory;

/// How a session driver answers each presented item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AnswerPolicy {
    AllCorrect,
    AllWrong,
    /// Correct on odd positions, wrong on even ones
    Alternating,
}

/// Manager for test databases
///
/// Each manager owns its own SQLite file, so tests never share state.
///
/// # Example
///
/// ```rust,ignore
/// let db = TestDatabaseManager::new_temp();
/// db.seed_topic("algebra", 5);
///
/// let now = Utc::now();
/// let session = db.start_practice("learner", &["algebra"], 5, now);
/// let results = db.answer_all(&session.session_id, AnswerPolicy::AllCorrect, 5.0, now);
/// ```
pub struct TestDatabaseManager {
    pub storage: Arc<Storage>,
    pub engine: Arc<SchedulerEngine>,
    pub selector: Arc<DueSetSelector>,
    pub sessions: SessionManager,
    /// Kept alive so the directory outlives the connections
    _temp_dir: Option<TempDir>,
    db_path: PathBuf,
}

impl TestDatabaseManager {
    /// Create a new test database in a temporary directory
    pub fn new_temp() -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let db_path = temp_dir.path().join("test_cadence.db");
        let mut manager = Self::open(db_path);
        manager._temp_dir = Some(temp_dir);
        manager
    }

    /// Open (or create) a test database at a specific path
    ///
    /// The database is NOT automatically deleted.
    pub fn new_at_path(path: PathBuf) -> Self {
        Self::open(path)
    }

    fn open(db_path: PathBuf) -> Self {
        let storage =
            Arc::new(Storage::new(Some(db_path.clone())).expect("Failed to create test storage"));
        let scheduler = Arc::new(FsrsMemoryScheduler::default());
        let engine = Arc::new(SchedulerEngine::new(Arc::clone(&storage), scheduler.clone()));
        let selector = Arc::new(DueSetSelector::new(Arc::clone(&storage), scheduler));
        let sessions = SessionManager::new(Arc::clone(&engine), Arc::clone(&selector));

        Self {
            storage,
            engine,
            selector,
            sessions,
            _temp_dir: None,
            db_path,
        }
    }

    pub fn path(&self) -> &PathBuf {
        &self.db_path
    }

    pub fn is_empty(&self) -> bool {
        self.item_count() == 0
    }

    pub fn item_count(&self) -> i64 {
        self.storage.count_items().unwrap_or(0)
    }

    /// Drop the connections and reopen the same file
    pub fn reopen(&mut self) {
        let temp_dir = self._temp_dir.take();
        let mut reopened = Self::open(self.db_path.clone());
        reopened._temp_dir = temp_dir;
        *self = reopened;
    }

    // ========================================================================
    // SEEDING METHODS
    // ========================================================================

    /// Seed `count` items in `topic`
    pub fn seed_topic(&self, topic: &str, count: usize) -> Vec<String> {
        TestDataFactory::seed_topic(&self.storage, topic, count)
    }

    /// Review `item_id` for `user_id` with an explicit rating
    pub fn review(
        &self,
        user_id: &str,
        item_id: &str,
        rating: ReviewRating,
        now: DateTime<Utc>,
    ) -> CardState {
        self.engine
            .review(user_id, item_id, ReviewInput::Explicit(rating as i64), now)
            .expect("review failed")
            .card
    }

    /// Graduate every item to the Review state with an `Easy` first review
    pub fn graduate(&self, user_id: &str, item_ids: &[String], now: DateTime<Utc>) -> Vec<CardState> {
        item_ids
            .iter()
            .map(|id| self.review(user_id, id, ReviewRating::Easy, now))
            .collect()
    }

    // ========================================================================
    // SESSION DRIVERS
    // ========================================================================

    /// Start a session with a fixed sampling seed; panics unless it started
    pub fn start(
        &self,
        user_id: &str,
        topics: &[&str],
        kind: SessionKind,
        limit: usize,
        now: DateTime<Utc>,
    ) -> SessionSummary {
        match self.try_start(user_id, topics, kind, limit, now) {
            StartOutcome::Started(summary) => summary,
            other => panic!("session did not start: {:?}", other),
        }
    }

    pub fn start_practice(
        &self,
        user_id: &str,
        topics: &[&str],
        limit: usize,
        now: DateTime<Utc>,
    ) -> SessionSummary {
        self.start(user_id, topics, SessionKind::Practice, limit, now)
    }

    pub fn try_start(
        &self,
        user_id: &str,
        topics: &[&str],
        kind: SessionKind,
        limit: usize,
        now: DateTime<Utc>,
    ) -> StartOutcome {
        let topics: Vec<String> = topics.iter().map(|t| t.to_string()).collect();
        let mut rng = StdRng::seed_from_u64(7);
        self.sessions
            .start_with_rng(user_id, &topics, kind, Some(limit), now, &mut rng)
            .expect("start failed")
    }

    /// Answer every remaining item of a session, in presentation order
    pub fn answer_all(
        &self,
        session_id: &str,
        policy: AnswerPolicy,
        response_time_secs: f64,
        now: DateTime<Utc>,
    ) -> Vec<(String, SubmitResult)> {
        let mut results = Vec::new();

        while let NextItem::Presented { item, position, .. } =
            self.sessions.next(session_id, now).expect("next failed")
        {
            let key = self
                .storage
                .get_item(&item.id)
                .expect("item lookup failed")
                .expect("presented item exists")
                .correct_indices;

            let correct = match policy {
                AnswerPolicy::AllCorrect => true,
                AnswerPolicy::AllWrong => false,
                AnswerPolicy::Alternating => position % 2 == 1,
            };
            let answer: Vec<i64> = if correct {
                key.iter().map(|&i| i as i64).collect()
            } else {
                // Any single option outside the key
                let wrong = (0..item.options.len())
                    .find(|i| !key.contains(i))
                    .unwrap_or(0);
                vec![wrong as i64]
            };

            let submission = Submission {
                item_id: item.id.clone(),
                answer,
                response_time_secs,
            };
            let result = self
                .sessions
                .submit(session_id, &submission, now)
                .expect("submit failed");
            results.push((item.id, result));
        }

        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cadence_core::LearningState;

    #[test]
    fn test_temp_database_creation() {
        let db = TestDatabaseManager::new_temp();
        assert!(db.is_empty());
        assert!(db.path().exists());
    }

    #[test]
    fn test_seed_topic() {
        let db = TestDatabaseManager::new_temp();
        let ids = db.seed_topic("geometry", 4);
        assert_eq!(ids.len(), 4);
        assert_eq!(db.item_count(), 4);
    }

    #[test]
    fn test_graduate_moves_cards_to_review() {
        let db = TestDatabaseManager::new_temp();
        let ids = db.seed_topic("geometry", 2);
        let cards = db.graduate("u1", &ids, Utc::now());
        assert!(cards.iter().all(|c| c.state == LearningState::Review));
    }

    #[test]
    fn test_reopen_keeps_data() {
        let mut db = TestDatabaseManager::new_temp();
        db.seed_topic("geometry", 3);
        db.reopen();
        assert_eq!(db.item_count(), 3);
    }
}
