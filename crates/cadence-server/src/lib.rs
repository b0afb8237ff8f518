//! Cadence Server
//!
//! HTTP surface over [`cadence_core::ReviewService`]. The `cadence-server`
//! binary serves it; the `cadence` binary is the operator CLI.

pub mod api;
