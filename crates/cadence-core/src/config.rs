//! Runtime configuration from the environment

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::scheduler::DEFAULT_MAX_CONFLICT_RETRIES;
use crate::session::{DEFAULT_SESSION_SIZE, MAX_SESSION_SIZE};

/// Default HTTP port
pub const DEFAULT_PORT: u16 = 3940;
/// Database file name inside the data directory
pub const DB_FILE_NAME: &str = "cadence.db";

/// Runtime configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Data directory; `None` means the platform default
    pub data_dir: Option<PathBuf>,
    pub port: u16,
    /// Items per session when the caller does not say
    pub session_size: usize,
    /// Target recall probability for the FSRS adapter
    pub request_retention: f64,
    pub max_conflict_retries: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            port: DEFAULT_PORT,
            session_size: DEFAULT_SESSION_SIZE,
            request_retention: 0.9,
            max_conflict_retries: DEFAULT_MAX_CONFLICT_RETRIES,
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|s| s.trim().parse().ok())
}

impl Config {
    /// Read `CADENCE_*` variables, falling back to defaults for anything
    /// missing or unparseable
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            data_dir: std::env::var("CADENCE_DATA_DIR")
                .ok()
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            port: env_parse("CADENCE_PORT").unwrap_or(defaults.port),
            session_size: env_parse::<usize>("CADENCE_SESSION_SIZE")
                .filter(|n| *n > 0)
                .map(|n| n.min(MAX_SESSION_SIZE))
                .unwrap_or(defaults.session_size),
            request_retention: env_parse::<f64>("CADENCE_REQUEST_RETENTION")
                .filter(|r| *r > 0.0 && *r < 1.0)
                .unwrap_or(defaults.request_retention),
            max_conflict_retries: env_parse("CADENCE_MAX_CONFLICT_RETRIES")
                .unwrap_or(defaults.max_conflict_retries),
        }
    }

    /// Database path; `None` lets storage pick its platform default
    pub fn db_path(&self) -> Option<PathBuf> {
        self.data_dir.as_ref().map(|dir| dir.join(DB_FILE_NAME))
    }
}
