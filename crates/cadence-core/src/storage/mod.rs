//! Storage Module
//!
//! SQLite-based storage layer with:
//! - Versioned schema migrations
//! - Separate reader/writer connections (`Send + Sync`)
//! - Uniqueness and optimistic-version guards for cards
//! - Legacy record normalization on read

mod migrations;
mod sqlite;

pub use migrations::{Migration, MIGRATIONS};
pub use sqlite::{format_timestamp, parse_timestamp, Result, Storage, StorageError};
