//! Review Service
//!
//! The facade the presentation layers call. Inputs are plain identifiers and
//! primitives, outputs are serializable records. Every call reads the clock
//! once and threads that instant through the lower layers.

use std::sync::Arc;

use chrono::Utc;

use crate::card::{CardState, CardStats};
use crate::catalog::ImportReport;
use crate::config::Config;
use crate::error::{CoreError, Result};
use crate::progress::ProgressSummary;
use crate::scheduler::{
    FsrsMemoryScheduler, FsrsSettings, MemoryScheduler, SchedulePreview, SchedulerEngine,
};
use crate::selection::{CardContext, DueCount, DueSetSelector};
use crate::session::{
    NextItem, SessionKind, SessionManager, StartOutcome, Submission, SubmitResult,
    DEFAULT_SESSION_SIZE,
};
use crate::storage::{Storage, StorageError};

/// Adaptive review operations for one store
pub struct ReviewService {
    storage: Arc<Storage>,
    engine: Arc<SchedulerEngine>,
    selector: Arc<DueSetSelector>,
    sessions: SessionManager,
    default_session_size: usize,
}

impl ReviewService {
    pub fn new(storage: Arc<Storage>, scheduler: Arc<dyn MemoryScheduler>) -> Self {
        Self::assemble(storage, scheduler, Config::default())
    }

    /// Open the configured store with the FSRS scheduler
    pub fn from_config(config: &Config) -> Result<Self> {
        let storage = Arc::new(Storage::new(config.db_path())?);
        let scheduler = Arc::new(FsrsMemoryScheduler::new(FsrsSettings {
            request_retention: config.request_retention,
        }));
        Ok(Self::assemble(storage, scheduler, config.clone()))
    }

    fn assemble(storage: Arc<Storage>, scheduler: Arc<dyn MemoryScheduler>, config: Config) -> Self {
        let engine = Arc::new(
            SchedulerEngine::new(Arc::clone(&storage), Arc::clone(&scheduler))
                .with_max_conflict_retries(config.max_conflict_retries),
        );
        let selector = Arc::new(DueSetSelector::new(Arc::clone(&storage), scheduler));
        let sessions = SessionManager::new(Arc::clone(&engine), Arc::clone(&selector));
        Self {
            storage,
            engine,
            selector,
            sessions,
            default_session_size: if config.session_size == 0 {
                DEFAULT_SESSION_SIZE
            } else {
                config.session_size
            },
        }
    }

    pub fn storage(&self) -> &Arc<Storage> {
        &self.storage
    }

    pub fn engine(&self) -> &Arc<SchedulerEngine> {
        &self.engine
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    /// Start a session over `topics`; `limit` defaults to the configured size
    pub fn start_session(
        &self,
        user_id: &str,
        topics: &[String],
        kind: SessionKind,
        limit: Option<usize>,
    ) -> Result<StartOutcome> {
        self.sessions.start(
            user_id,
            topics,
            kind,
            Some(limit.unwrap_or(self.default_session_size)),
            Utc::now(),
        )
    }

    pub fn next_item(&self, session_id: &str) -> Result<NextItem> {
        self.sessions.next(session_id, Utc::now())
    }

    pub fn submit_answer(
        &self,
        session_id: &str,
        item_id: &str,
        answer: Vec<i64>,
        response_time_secs: f64,
    ) -> Result<SubmitResult> {
        let submission = Submission {
            item_id: item_id.to_string(),
            answer,
            response_time_secs,
        };
        self.sessions.submit(session_id, &submission, Utc::now())
    }

    // ========================================================================
    // PROGRESS
    // ========================================================================

    pub fn due_count(&self, user_id: &str) -> Result<DueCount> {
        self.selector.count(user_id, Utc::now())
    }

    /// Due cards with item context, oldest due first
    pub fn due_items(&self, user_id: &str, limit: usize) -> Result<Vec<CardContext>> {
        self.selector.with_item_context(user_id, Utc::now(), limit)
    }

    pub fn progress_summary(&self, user_id: &str) -> Result<ProgressSummary> {
        let progress = self.storage.get_progress(user_id)?;
        Ok(ProgressSummary {
            user_id: user_id.to_string(),
            total_answered: progress.total_answered,
            total_correct: progress.total_correct,
            accuracy: progress.accuracy(),
            current_streak: progress.current_streak,
            best_streak: progress.best_streak,
            topics: self.storage.topic_progress(user_id)?,
            cards: self.storage.card_stats(user_id)?,
        })
    }

    pub fn user_stats(&self, user_id: &str) -> Result<CardStats> {
        Ok(self.storage.card_stats(user_id)?)
    }

    // ========================================================================
    // OPERATOR
    // ========================================================================

    pub fn reset_card(&self, user_id: &str, item_id: &str) -> Result<CardState> {
        self.engine.reset(user_id, item_id, Utc::now())
    }

    pub fn preview(&self, user_id: &str, item_id: &str) -> Result<Vec<SchedulePreview>> {
        self.engine.preview(user_id, item_id, Utc::now())
    }

    pub fn topics(&self) -> Result<Vec<String>> {
        Ok(self.storage.distinct_topics()?)
    }

    /// Import a JSON array of item documents
    pub fn import_items(&self, json: &str) -> Result<ImportReport> {
        self.storage.import_items(json).map_err(|e| match e {
            StorageError::InvalidDocument(msg) => CoreError::InvalidInput(msg),
            StorageError::Serialization(e) => {
                CoreError::InvalidInput(format!("malformed item JSON: {}", e))
            }
            other => other.into(),
        })
    }
}
