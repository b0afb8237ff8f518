//! Database Migrations
//!
//! Schema migration definitions for the storage layer.

/// Migration definitions
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        description: "Initial schema: item catalog and per-user cards",
        up: MIGRATION_V1_UP,
    },
    Migration {
        version: 2,
        description: "Lesson sessions with available/used item sets",
        up: MIGRATION_V2_UP,
    },
    Migration {
        version: 3,
        description: "User progress counters and append-only review records",
        up: MIGRATION_V3_UP,
    },
];

/// A database migration
#[derive(Debug, Clone)]
pub struct Migration {
    /// Version number
    pub version: u32,
    /// Description
    pub description: &'static str,
    /// SQL to apply
    pub up: &'static str,
}

/// V1: Initial schema
const MIGRATION_V1_UP: &str = r#"
CREATE TABLE IF NOT EXISTS items (
    id TEXT PRIMARY KEY,
    text TEXT NOT NULL,
    options TEXT NOT NULL DEFAULT '[]',
    correct_indices TEXT NOT NULL DEFAULT '[]',
    topic TEXT NOT NULL,
    sub_topic TEXT,
    difficulty INTEGER NOT NULL DEFAULT 3,
    explanation TEXT,
    tags TEXT NOT NULL DEFAULT '[]',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_items_topic ON items(topic);

-- One card per (user, item); the primary key is the uniqueness guard
-- that makes lazy creation safe across processes
CREATE TABLE IF NOT EXISTS cards (
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,

    -- Learning state machine
    state TEXT NOT NULL DEFAULT 'learning',
    step INTEGER DEFAULT 0,

    -- Memory model
    stability REAL DEFAULT 2.5,
    difficulty REAL DEFAULT 2.5,
    elapsed_days INTEGER NOT NULL DEFAULT 0,
    scheduled_days INTEGER NOT NULL DEFAULT 0,
    reps INTEGER NOT NULL DEFAULT 0,
    lapses INTEGER NOT NULL DEFAULT 0,

    -- Scheduling
    due_date TEXT NOT NULL,
    last_review TEXT,

    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,

    -- Optimistic concurrency
    version INTEGER NOT NULL DEFAULT 0,

    PRIMARY KEY (user_id, item_id)
);

CREATE INDEX IF NOT EXISTS idx_cards_user_due ON cards(user_id, due_date);
CREATE INDEX IF NOT EXISTS idx_cards_user_state ON cards(user_id, state);

-- Schema version tracking
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER PRIMARY KEY,
    applied_at TEXT NOT NULL
);

INSERT OR IGNORE INTO schema_version (version, applied_at) VALUES (1, datetime('now'));
"#;

/// V2: Lesson sessions
const MIGRATION_V2_UP: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    session_id TEXT PRIMARY KEY,
    user_id TEXT NOT NULL,
    selected_topics TEXT NOT NULL DEFAULT '[]',
    kind TEXT NOT NULL DEFAULT 'practice',
    available_items TEXT NOT NULL DEFAULT '[]',  -- JSON: ordered item ids
    used_items TEXT NOT NULL DEFAULT '[]',       -- JSON: item ids in presentation order
    phase TEXT NOT NULL DEFAULT 'active',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_user ON sessions(user_id);

UPDATE schema_version SET version = 2, applied_at = datetime('now');
"#;

/// V3: Progress counters and review records
const MIGRATION_V3_UP: &str = r#"
CREATE TABLE IF NOT EXISTS user_progress (
    user_id TEXT PRIMARY KEY,
    total_answered INTEGER NOT NULL DEFAULT 0,
    total_correct INTEGER NOT NULL DEFAULT 0,
    current_streak INTEGER NOT NULL DEFAULT 0,
    best_streak INTEGER NOT NULL DEFAULT 0,
    updated_at TEXT NOT NULL
);

-- Append-only; rows are never updated
CREATE TABLE IF NOT EXISTS review_records (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id TEXT NOT NULL,
    item_id TEXT NOT NULL,
    session_id TEXT,
    answer TEXT NOT NULL DEFAULT '[]',
    is_correct INTEGER NOT NULL,
    response_time REAL NOT NULL DEFAULT 0,
    rating INTEGER NOT NULL,
    state_before TEXT NOT NULL,
    elapsed_days INTEGER NOT NULL DEFAULT 0,
    scheduled_days INTEGER NOT NULL DEFAULT 0,
    reviewed_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_review_records_user ON review_records(user_id, reviewed_at);
CREATE INDEX IF NOT EXISTS idx_review_records_item ON review_records(item_id);

UPDATE schema_version SET version = 3, applied_at = datetime('now');
"#;

/// Get current schema version from database
pub fn get_current_version(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    conn.query_row(
        "SELECT COALESCE(MAX(version), 0) FROM schema_version",
        [],
        |row| row.get(0),
    )
    .or(Ok(0))
}

/// Apply pending migrations
pub fn apply_migrations(conn: &rusqlite::Connection) -> rusqlite::Result<u32> {
    let current_version = get_current_version(conn)?;
    let mut applied = 0;

    for migration in MIGRATIONS {
        if migration.version > current_version {
            tracing::info!(
                "Applying migration v{}: {}",
                migration.version,
                migration.description
            );

            // Use execute_batch to handle multi-statement SQL
            conn.execute_batch(migration.up)?;
            applied += 1;
        }
    }

    Ok(applied)
}
