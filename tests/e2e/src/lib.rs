//! End-to-end test support for Cadence
//!
//! - `harness`: isolated stores wired with the real scheduler stack
//! - `mocks`: item fixtures and catalog documents

pub mod harness;
pub mod mocks;

pub use harness::db_manager::TestDatabaseManager;
pub use mocks::fixtures::TestDataFactory;
