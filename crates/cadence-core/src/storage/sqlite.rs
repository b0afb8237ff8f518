//! SQLite Storage Implementation
//!
//! Item catalog, per-user cards, sessions and progress counters.

use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use directories::ProjectDirs;
use rusqlite::{params, params_from_iter, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use crate::card::{CardState, CardStats, LearningState, StateStats, DEFAULT_DIFFICULTY, DEFAULT_STABILITY};
use crate::catalog::{normalize_document, ImportReport, Item, DEFAULT_ITEM_DIFFICULTY};
use crate::progress::{ReviewRecord, TopicProgress, UserProgress};
use crate::rating::ReviewRating;
use crate::session::{Session, SessionKind, SessionPhase};

// ============================================================================
// ERROR TYPES
// ============================================================================

/// Storage error type
#[non_exhaustive]
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),
    /// Record not found
    #[error("Not found: {0}")]
    NotFound(String),
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    /// JSON column or import document could not be (de)serialized
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    /// Document rejected at the store boundary
    #[error("Invalid document: {0}")]
    InvalidDocument(String),
    /// Invalid timestamp
    #[error("Invalid timestamp: {0}")]
    InvalidTimestamp(String),
    /// Initialization error
    #[error("Initialization error: {0}")]
    Init(String),
}

/// Storage result type
pub type Result<T> = std::result::Result<T, StorageError>;

// ============================================================================
// TIMESTAMPS
// ============================================================================

/// Canonical stored form: fixed-width UTC, so text order is time order
pub fn format_timestamp(dt: DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Parse a stored timestamp into UTC.
///
/// Accepts RFC 3339 with any offset, and naive timestamps written by older
/// importers (taken as UTC).
pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(value, fmt).ok())
        .map(|naive| naive.and_utc())
}

fn timestamp_column(value: &str, field_name: &str) -> rusqlite::Result<DateTime<Utc>> {
    parse_timestamp(value).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(StorageError::InvalidTimestamp(format!(
                "{} '{}'",
                field_name, value
            ))),
        )
    })
}

fn json_column<T: serde::de::DeserializeOwned>(value: &str, field_name: &str) -> rusqlite::Result<T> {
    serde_json::from_str(value).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(
            0,
            rusqlite::types::Type::Text,
            Box::new(StorageError::InvalidDocument(format!("{} column: {}", field_name, e))),
        )
    })
}

fn unsigned(value: i64) -> u32 {
    value.clamp(0, i64::from(u32::MAX)) as u32
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}

// ============================================================================
// STORAGE
// ============================================================================

/// Main storage struct
///
/// Uses separate reader/writer connections for interior mutability.
/// All methods take `&self`, making Storage `Send + Sync` so callers can
/// share an `Arc<Storage>`.
pub struct Storage {
    writer: Mutex<Connection>,
    reader: Mutex<Connection>,
}

impl Storage {
    /// Apply PRAGMAs and optional encryption to a connection
    fn configure_connection(conn: &Connection) -> Result<()> {
        #[cfg(feature = "encryption")]
        {
            if let Ok(key) = std::env::var("CADENCE_ENCRYPTION_KEY") {
                if !key.is_empty() {
                    conn.pragma_update(None, "key", &key)?;
                }
            }
        }

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA cache_size = -16000;
             PRAGMA temp_store = MEMORY;
             PRAGMA foreign_keys = ON;
             PRAGMA busy_timeout = 5000;",
        )?;

        Ok(())
    }

    /// Default database location in the per-user data directory
    pub fn default_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("com", "cadence", "core").ok_or_else(|| {
            StorageError::Init("Could not determine project directories".to_string())
        })?;

        let data_dir = proj_dirs.data_dir();
        std::fs::create_dir_all(data_dir)?;
        // Restrict directory permissions to owner-only on Unix
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o700);
            let _ = std::fs::set_permissions(data_dir, perms);
        }
        Ok(data_dir.join("cadence.db"))
    }

    /// Create new storage instance
    pub fn new(db_path: Option<PathBuf>) -> Result<Self> {
        let path = match db_path {
            Some(p) => {
                if let Some(parent) = p.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
                p
            }
            None => Self::default_path()?,
        };

        let writer_conn = Connection::open(&path)?;

        // Restrict database file permissions to owner-only on Unix
        #[cfg(unix)]
        if path.exists() {
            use std::os::unix::fs::PermissionsExt;
            let perms = std::fs::Permissions::from_mode(0o600);
            let _ = std::fs::set_permissions(&path, perms);
        }

        Self::configure_connection(&writer_conn)?;

        // Apply migrations on writer only
        let applied = super::migrations::apply_migrations(&writer_conn)?;
        if applied > 0 {
            tracing::info!("Database at {} migrated ({} applied)", path.display(), applied);
        }

        let reader_conn = Connection::open(&path)?;
        Self::configure_connection(&reader_conn)?;

        Ok(Self {
            writer: Mutex::new(writer_conn),
            reader: Mutex::new(reader_conn),
        })
    }

    fn writer(&self) -> Result<MutexGuard<'_, Connection>> {
        self.writer
            .lock()
            .map_err(|_| StorageError::Init("Writer lock poisoned".into()))
    }

    fn reader(&self) -> Result<MutexGuard<'_, Connection>> {
        self.reader
            .lock()
            .map_err(|_| StorageError::Init("Reader lock poisoned".into()))
    }

    // ========================================================================
    // ITEM CATALOG
    // ========================================================================

    fn row_to_item(row: &rusqlite::Row) -> rusqlite::Result<Item> {
        Self::row_to_item_with(row, "difficulty")
    }

    /// Item mapper for joins where `difficulty` is shadowed by the card column
    fn row_to_item_with(row: &rusqlite::Row, difficulty_column: &str) -> rusqlite::Result<Item> {
        let options: String = row.get("options")?;
        let correct: String = row.get("correct_indices")?;
        let tags: String = row.get("tags")?;
        let difficulty: Option<i64> = row.get(difficulty_column)?;

        Ok(Item {
            id: row.get("id")?,
            text: row.get("text")?,
            options: json_column(&options, "options")?,
            correct_indices: json_column(&correct, "correct_indices")?,
            topic: row.get("topic")?,
            sub_topic: row.get("sub_topic")?,
            difficulty: difficulty
                .map(|d| d.clamp(1, 5) as u8)
                .unwrap_or(DEFAULT_ITEM_DIFFICULTY),
            explanation: row.get("explanation")?,
            tags: json_column(&tags, "tags")?,
        })
    }

    fn write_item(conn: &Connection, item: &Item, now: &str) -> Result<()> {
        item.validate().map_err(StorageError::InvalidDocument)?;
        conn.execute(
            "INSERT INTO items (
                id, text, options, correct_indices, topic, sub_topic,
                difficulty, explanation, tags, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?10)
            ON CONFLICT(id) DO UPDATE SET
                text = excluded.text,
                options = excluded.options,
                correct_indices = excluded.correct_indices,
                topic = excluded.topic,
                sub_topic = excluded.sub_topic,
                difficulty = excluded.difficulty,
                explanation = excluded.explanation,
                tags = excluded.tags,
                updated_at = excluded.updated_at",
            params![
                item.id,
                item.text,
                serde_json::to_string(&item.options)?,
                serde_json::to_string(&item.correct_indices)?,
                item.topic.to_lowercase(),
                item.sub_topic,
                i64::from(item.difficulty.clamp(1, 5)),
                item.explanation,
                serde_json::to_string(&item.tags)?,
                now,
            ],
        )?;
        Ok(())
    }

    /// Insert or replace one item
    pub fn upsert_item(&self, item: &Item) -> Result<()> {
        let now = format_timestamp(Utc::now());
        let writer = self.writer()?;
        Self::write_item(&writer, item, &now)
    }

    /// Import a JSON array of item documents in one transaction.
    ///
    /// Every document is normalized first; a single bad document rejects the
    /// whole import.
    pub fn import_items(&self, json: &str) -> Result<ImportReport> {
        let docs: Vec<serde_json::Value> = match serde_json::from_str::<serde_json::Value>(json)? {
            serde_json::Value::Array(docs) => docs,
            other @ serde_json::Value::Object(_) => vec![other],
            _ => {
                return Err(StorageError::InvalidDocument(
                    "expected an array of item documents".to_string(),
                ))
            }
        };

        let items = docs
            .iter()
            .enumerate()
            .map(|(i, doc)| {
                normalize_document(doc)
                    .map_err(|e| StorageError::InvalidDocument(format!("document {}: {}", i, e)))
            })
            .collect::<Result<Vec<_>>>()?;

        let now = format_timestamp(Utc::now());
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        for item in &items {
            Self::write_item(&tx, item, &now)?;
        }
        tx.commit()?;

        let mut topics: Vec<String> = items.iter().map(|i| i.topic.clone()).collect();
        topics.sort();
        topics.dedup();

        tracing::info!("Imported {} items across {} topics", items.len(), topics.len());

        Ok(ImportReport {
            imported: items.len(),
            topics,
        })
    }

    /// Get an item by id
    pub fn get_item(&self, id: &str) -> Result<Option<Item>> {
        let reader = self.reader()?;
        let item = reader
            .query_row("SELECT * FROM items WHERE id = ?1", params![id], Self::row_to_item)
            .optional()?;
        Ok(item)
    }

    /// Items whose topic equals one of `topics` (lower-cased)
    pub fn items_by_topics(&self, topics: &[String]) -> Result<Vec<Item>> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let sql = format!(
            "SELECT * FROM items WHERE lower(topic) IN ({}) ORDER BY id",
            placeholders(topics.len())
        );
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let items = stmt
            .query_map(
                params_from_iter(topics.iter().map(|t| t.to_lowercase())),
                Self::row_to_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Items whose topic contains one of `topics`, case-insensitively
    pub fn items_by_topic_substring(&self, topics: &[String]) -> Result<Vec<Item>> {
        if topics.is_empty() {
            return Ok(Vec::new());
        }
        let clauses = vec!["instr(lower(topic), ?) > 0"; topics.len()].join(" OR ");
        let sql = format!("SELECT * FROM items WHERE {} ORDER BY id", clauses);
        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let items = stmt
            .query_map(
                params_from_iter(topics.iter().map(|t| t.to_lowercase())),
                Self::row_to_item,
            )?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(items)
    }

    /// Distinct catalog topics, sorted
    pub fn distinct_topics(&self) -> Result<Vec<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT DISTINCT lower(topic) FROM items ORDER BY 1")?;
        let topics = stmt
            .query_map([], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<String>>>()?;
        Ok(topics)
    }

    /// Number of catalog items
    pub fn count_items(&self) -> Result<i64> {
        let reader = self.reader()?;
        Ok(reader.query_row("SELECT COUNT(*) FROM items", [], |row| row.get(0))?)
    }

    // ========================================================================
    // CARDS
    // ========================================================================

    /// Convert a row to CardState, repairing legacy values
    fn row_to_card(row: &rusqlite::Row) -> rusqlite::Result<CardState> {
        let state: String = row.get("state")?;
        let step: Option<i64> = row.get("step")?;
        let stability: Option<f64> = row.get("stability")?;
        let difficulty: Option<f64> = row.get("difficulty")?;

        let due_date: String = row.get("due_date")?;
        let last_review: Option<String> = row.get("last_review")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        let card = CardState {
            user_id: row.get("user_id")?,
            item_id: row.get("item_id")?,
            state: LearningState::parse_name(&state).unwrap_or_default(),
            step: step.map(unsigned),
            stability: stability.unwrap_or(DEFAULT_STABILITY),
            difficulty: difficulty.unwrap_or(DEFAULT_DIFFICULTY),
            elapsed_days: unsigned(row.get("elapsed_days")?),
            scheduled_days: unsigned(row.get("scheduled_days")?),
            reps: unsigned(row.get("reps")?),
            lapses: unsigned(row.get("lapses")?),
            due_date: timestamp_column(&due_date, "due_date")?,
            last_review: last_review
                .as_deref()
                .map(|s| timestamp_column(s, "last_review"))
                .transpose()?,
            created_at: timestamp_column(&created_at, "created_at")?,
            updated_at: timestamp_column(&updated_at, "updated_at")?,
            version: row.get("version")?,
        };

        Ok(card.normalized())
    }

    /// Get the card for (user, item)
    pub fn get_card(&self, user_id: &str, item_id: &str) -> Result<Option<CardState>> {
        let reader = self.reader()?;
        let card = reader
            .query_row(
                "SELECT * FROM cards WHERE user_id = ?1 AND item_id = ?2",
                params![user_id, item_id],
                Self::row_to_card,
            )
            .optional()?;
        Ok(card)
    }

    /// Return the existing card or insert a fresh one due at `now`.
    ///
    /// The primary key arbitrates concurrent creators; a loser re-reads the
    /// winner's row.
    pub fn get_or_create_card(
        &self,
        user_id: &str,
        item_id: &str,
        now: DateTime<Utc>,
    ) -> Result<CardState> {
        if let Some(card) = self.get_card(user_id, item_id)? {
            return Ok(card);
        }

        let card = CardState::new(user_id, item_id, now);
        let inserted = {
            let writer = self.writer()?;
            writer.execute(
                "INSERT INTO cards (
                    user_id, item_id, state, step, stability, difficulty,
                    elapsed_days, scheduled_days, reps, lapses,
                    due_date, last_review, created_at, updated_at, version
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 0, 0, 0, ?7, NULL, ?7, ?7, 0)",
                params![
                    card.user_id,
                    card.item_id,
                    card.state.as_str(),
                    card.step.map(i64::from),
                    card.stability,
                    card.difficulty,
                    format_timestamp(now),
                ],
            )
        };

        match inserted {
            Ok(_) => {
                tracing::debug!("Created card {}/{}", user_id, item_id);
                Ok(card)
            }
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                tracing::debug!("Card {}/{} created concurrently, re-reading", user_id, item_id);
                self.get_card(user_id, item_id)?
                    .ok_or_else(|| StorageError::NotFound(format!("card {}/{}", user_id, item_id)))
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Persist `card` if the stored version still equals `expected_version`.
    ///
    /// Returns false when another writer got there first. On success the
    /// stored version is `expected_version + 1`.
    pub fn update_card(&self, card: &CardState, expected_version: i64) -> Result<bool> {
        let writer = self.writer()?;
        Self::write_card(&writer, card, expected_version)
    }

    fn write_card(conn: &Connection, card: &CardState, expected_version: i64) -> Result<bool> {
        let changed = conn.execute(
            "UPDATE cards SET
                state = ?1, step = ?2, stability = ?3, difficulty = ?4,
                elapsed_days = ?5, scheduled_days = ?6, reps = ?7, lapses = ?8,
                due_date = ?9, last_review = ?10, updated_at = ?11,
                version = version + 1
            WHERE user_id = ?12 AND item_id = ?13 AND version = ?14",
            params![
                card.state.as_str(),
                card.step.map(i64::from),
                card.stability,
                card.difficulty,
                i64::from(card.elapsed_days),
                i64::from(card.scheduled_days),
                i64::from(card.reps),
                i64::from(card.lapses),
                format_timestamp(card.due_date),
                card.last_review.map(format_timestamp),
                format_timestamp(card.updated_at),
                card.user_id,
                card.item_id,
                expected_version,
            ],
        )?;
        Ok(changed == 1)
    }

    fn query_cards(&self, sql: &str, params: &[&dyn rusqlite::ToSql]) -> Result<Vec<CardState>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(sql)?;
        let cards = stmt
            .query_map(params, Self::row_to_card)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(cards)
    }

    /// Cards due at `now`, oldest due first (ties by item id)
    pub fn due_cards(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        review_only: bool,
    ) -> Result<Vec<CardState>> {
        let sql = format!(
            "SELECT * FROM cards
             WHERE user_id = ?1 AND julianday(due_date) <= julianday(?2) {}
             ORDER BY julianday(due_date) ASC, item_id ASC
             LIMIT ?3",
            if review_only { "AND state = 'review'" } else { "" }
        );
        self.query_cards(
            &sql,
            params![user_id, format_timestamp(now), limit as i64],
        )
    }

    /// Cards created but never reviewed
    pub fn new_cards(&self, user_id: &str, limit: usize) -> Result<Vec<CardState>> {
        self.query_cards(
            "SELECT * FROM cards
             WHERE user_id = ?1 AND state = 'learning' AND last_review IS NULL
             ORDER BY julianday(due_date) ASC, item_id ASC
             LIMIT ?2",
            params![user_id, limit as i64],
        )
    }

    /// Cards in one learning state
    pub fn cards_by_state(
        &self,
        user_id: &str,
        state: LearningState,
        limit: usize,
    ) -> Result<Vec<CardState>> {
        self.query_cards(
            "SELECT * FROM cards
             WHERE user_id = ?1 AND state = ?2
             ORDER BY julianday(due_date) ASC, item_id ASC
             LIMIT ?3",
            params![user_id, state.as_str(), limit as i64],
        )
    }

    /// Due cards joined with their catalog items in one query.
    ///
    /// Cards whose item no longer exists are not returned.
    pub fn due_cards_with_items(
        &self,
        user_id: &str,
        now: DateTime<Utc>,
        limit: usize,
        review_only: bool,
    ) -> Result<Vec<(CardState, Item)>> {
        let sql = format!(
            "SELECT c.*, i.id, i.text, i.options, i.correct_indices, i.topic,
                    i.sub_topic, i.difficulty AS item_difficulty, i.explanation, i.tags
             FROM cards c
             INNER JOIN items i ON i.id = c.item_id
             WHERE c.user_id = ?1 AND julianday(c.due_date) <= julianday(?2) {}
             ORDER BY julianday(c.due_date) ASC, c.item_id ASC
             LIMIT ?3",
            if review_only { "AND c.state = 'review'" } else { "" }
        );

        let reader = self.reader()?;
        let mut stmt = reader.prepare(&sql)?;
        let rows = stmt
            .query_map(params![user_id, format_timestamp(now), limit as i64], |row| {
                Ok((
                    Self::row_to_card(row)?,
                    Self::row_to_item_with(row, "item_difficulty")?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Number of due cards
    pub fn count_due(&self, user_id: &str, now: DateTime<Utc>, review_only: bool) -> Result<i64> {
        let sql = format!(
            "SELECT COUNT(*) FROM cards
             WHERE user_id = ?1 AND julianday(due_date) <= julianday(?2) {}",
            if review_only { "AND state = 'review'" } else { "" }
        );
        let reader = self.reader()?;
        Ok(reader.query_row(&sql, params![user_id, format_timestamp(now)], |row| row.get(0))?)
    }

    /// Ids of every item the user has a card for
    pub fn card_item_ids(&self, user_id: &str) -> Result<HashSet<String>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare("SELECT item_id FROM cards WHERE user_id = ?1")?;
        let ids = stmt
            .query_map(params![user_id], |row| row.get(0))?
            .collect::<rusqlite::Result<HashSet<String>>>()?;
        Ok(ids)
    }

    /// Aggregate card statistics for one user
    pub fn card_stats(&self, user_id: &str) -> Result<CardStats> {
        let reader = self.reader()?;

        let (total_reps, total_lapses): (i64, i64) = reader.query_row(
            "SELECT COALESCE(SUM(reps), 0), COALESCE(SUM(lapses), 0)
             FROM cards WHERE user_id = ?1",
            params![user_id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )?;

        let mut stmt = reader.prepare(
            "SELECT state,
                    COUNT(*),
                    AVG(CASE WHEN stability > 0 THEN stability ELSE 2.5 END),
                    AVG(CASE WHEN difficulty > 0 THEN difficulty ELSE 2.5 END)
             FROM cards WHERE user_id = ?1
             GROUP BY state
             ORDER BY state",
        )?;
        let by_state = stmt
            .query_map(params![user_id], |row| {
                let state: String = row.get(0)?;
                Ok(StateStats {
                    state: LearningState::parse_name(&state).unwrap_or_default(),
                    count: row.get(1)?,
                    avg_stability: row.get::<_, Option<f64>>(2)?.unwrap_or(DEFAULT_STABILITY),
                    avg_difficulty: row.get::<_, Option<f64>>(3)?.unwrap_or(DEFAULT_DIFFICULTY),
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(CardStats::from_states(by_state, total_reps, total_lapses))
    }

    // ========================================================================
    // SESSIONS
    // ========================================================================

    fn row_to_session(row: &rusqlite::Row) -> rusqlite::Result<Session> {
        let topics: String = row.get("selected_topics")?;
        let kind: String = row.get("kind")?;
        let available: String = row.get("available_items")?;
        let used: String = row.get("used_items")?;
        let phase: String = row.get("phase")?;
        let created_at: String = row.get("created_at")?;
        let updated_at: String = row.get("updated_at")?;

        Ok(Session {
            session_id: row.get("session_id")?,
            user_id: row.get("user_id")?,
            selected_topics: json_column(&topics, "selected_topics")?,
            kind: SessionKind::parse_name(&kind).unwrap_or_default(),
            available_items: json_column(&available, "available_items")?,
            used_items: json_column(&used, "used_items")?,
            phase: SessionPhase::parse_name(&phase).unwrap_or(SessionPhase::Active),
            created_at: timestamp_column(&created_at, "created_at")?,
            updated_at: timestamp_column(&updated_at, "updated_at")?,
        })
    }

    /// Persist a new session
    pub fn insert_session(&self, session: &Session) -> Result<()> {
        let writer = self.writer()?;
        writer.execute(
            "INSERT INTO sessions (
                session_id, user_id, selected_topics, kind,
                available_items, used_items, phase, created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                session.session_id,
                session.user_id,
                serde_json::to_string(&session.selected_topics)?,
                session.kind.as_str(),
                serde_json::to_string(&session.available_items)?,
                serde_json::to_string(&session.used_items)?,
                session.phase.as_str(),
                format_timestamp(session.created_at),
                format_timestamp(session.updated_at),
            ],
        )?;
        Ok(())
    }

    /// Get a session by id
    pub fn get_session(&self, session_id: &str) -> Result<Option<Session>> {
        let reader = self.reader()?;
        let session = reader
            .query_row(
                "SELECT * FROM sessions WHERE session_id = ?1",
                params![session_id],
                Self::row_to_session,
            )
            .optional()?;
        Ok(session)
    }

    /// Write back the mutable parts of a session
    pub fn update_session(&self, session: &Session) -> Result<()> {
        let writer = self.writer()?;
        let changed = writer.execute(
            "UPDATE sessions SET
                available_items = ?1, used_items = ?2, phase = ?3, updated_at = ?4
            WHERE session_id = ?5",
            params![
                serde_json::to_string(&session.available_items)?,
                serde_json::to_string(&session.used_items)?,
                session.phase.as_str(),
                format_timestamp(session.updated_at),
                session.session_id,
            ],
        )?;
        if changed == 0 {
            return Err(StorageError::NotFound(format!("session {}", session.session_id)));
        }
        Ok(())
    }

    // ========================================================================
    // PROGRESS
    // ========================================================================

    fn read_progress(conn: &Connection, user_id: &str) -> Result<UserProgress> {
        let progress = conn
            .query_row(
                "SELECT total_answered, total_correct, current_streak, best_streak, updated_at
                 FROM user_progress WHERE user_id = ?1",
                params![user_id],
                |row| {
                    let updated_at: String = row.get(4)?;
                    Ok(UserProgress {
                        user_id: user_id.to_string(),
                        total_answered: unsigned(row.get(0)?),
                        total_correct: unsigned(row.get(1)?),
                        current_streak: unsigned(row.get(2)?),
                        best_streak: unsigned(row.get(3)?),
                        updated_at: Some(timestamp_column(&updated_at, "updated_at")?),
                    })
                },
            )
            .optional()?;
        Ok(progress.unwrap_or_else(|| UserProgress::empty(user_id)))
    }

    /// Counters for a user; all zeros when the user has never answered
    pub fn get_progress(&self, user_id: &str) -> Result<UserProgress> {
        let reader = self.reader()?;
        Self::read_progress(&reader, user_id)
    }

    /// Count one answer and return the updated counters
    pub fn record_answer(
        &self,
        user_id: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<UserProgress> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;
        let progress = Self::write_progress(&tx, user_id, is_correct, now)?;
        tx.commit()?;
        Ok(progress)
    }

    fn write_progress(
        conn: &Connection,
        user_id: &str,
        is_correct: bool,
        now: DateTime<Utc>,
    ) -> Result<UserProgress> {
        let mut progress = Self::read_progress(conn, user_id)?;
        progress.record(is_correct, now);

        conn.execute(
            "INSERT INTO user_progress (
                user_id, total_answered, total_correct, current_streak, best_streak, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            ON CONFLICT(user_id) DO UPDATE SET
                total_answered = excluded.total_answered,
                total_correct = excluded.total_correct,
                current_streak = excluded.current_streak,
                best_streak = excluded.best_streak,
                updated_at = excluded.updated_at",
            params![
                user_id,
                i64::from(progress.total_answered),
                i64::from(progress.total_correct),
                i64::from(progress.current_streak),
                i64::from(progress.best_streak),
                format_timestamp(now),
            ],
        )?;
        Ok(progress)
    }

    /// Append a review record
    pub fn append_review_record(&self, record: &ReviewRecord) -> Result<i64> {
        let writer = self.writer()?;
        Self::write_review_record(&writer, record)
    }

    fn write_review_record(conn: &Connection, record: &ReviewRecord) -> Result<i64> {
        conn.execute(
            "INSERT INTO review_records (
                user_id, item_id, session_id, answer, is_correct, response_time,
                rating, state_before, elapsed_days, scheduled_days, reviewed_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.user_id,
                record.item_id,
                record.session_id,
                serde_json::to_string(&record.answer)?,
                record.is_correct,
                record.response_time_secs,
                record.rating.as_i64(),
                record.state_before.as_str(),
                i64::from(record.elapsed_days),
                i64::from(record.scheduled_days),
                format_timestamp(record.reviewed_at),
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    /// Persist a graded answer in one transaction: the card update (guarded
    /// by `expected_version`), the user's counters and the review record.
    ///
    /// Returns `None` and writes nothing when the card version moved.
    pub fn commit_answer(
        &self,
        card: &CardState,
        expected_version: i64,
        record: &ReviewRecord,
    ) -> Result<Option<UserProgress>> {
        let mut writer = self.writer()?;
        let tx = writer.transaction()?;

        if !Self::write_card(&tx, card, expected_version)? {
            return Ok(None);
        }
        let progress =
            Self::write_progress(&tx, &record.user_id, record.is_correct, record.reviewed_at)?;
        Self::write_review_record(&tx, record)?;
        tx.commit()?;

        Ok(Some(progress))
    }

    /// Most recent review records for a user, newest first
    pub fn review_records(&self, user_id: &str, limit: usize) -> Result<Vec<ReviewRecord>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT user_id, item_id, session_id, answer, is_correct, response_time,
                    rating, state_before, elapsed_days, scheduled_days, reviewed_at
             FROM review_records WHERE user_id = ?1
             ORDER BY reviewed_at DESC, id DESC
             LIMIT ?2",
        )?;
        let records = stmt
            .query_map(params![user_id, limit as i64], |row| {
                let answer: String = row.get(3)?;
                let rating: i64 = row.get(6)?;
                let state_before: String = row.get(7)?;
                let reviewed_at: String = row.get(10)?;
                Ok(ReviewRecord {
                    user_id: row.get(0)?,
                    item_id: row.get(1)?,
                    session_id: row.get(2)?,
                    answer: json_column(&answer, "answer")?,
                    is_correct: row.get(4)?,
                    response_time_secs: row.get(5)?,
                    rating: ReviewRating::from_i64(rating).unwrap_or(ReviewRating::Again),
                    state_before: LearningState::parse_name(&state_before).unwrap_or_default(),
                    elapsed_days: unsigned(row.get(8)?),
                    scheduled_days: unsigned(row.get(9)?),
                    reviewed_at: timestamp_column(&reviewed_at, "reviewed_at")?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(records)
    }

    /// Distinct items answered per topic
    pub fn topic_progress(&self, user_id: &str) -> Result<Vec<TopicProgress>> {
        let reader = self.reader()?;
        let mut stmt = reader.prepare(
            "SELECT i.topic, COUNT(DISTINCT r.item_id)
             FROM review_records r
             INNER JOIN items i ON i.id = r.item_id
             WHERE r.user_id = ?1
             GROUP BY i.topic
             ORDER BY i.topic",
        )?;
        let topics = stmt
            .query_map(params![user_id], |row| {
                Ok(TopicProgress {
                    topic: row.get(0)?,
                    items_answered: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(topics)
    }
}

// ============================================================================
// TESTS
// ============================================================================
