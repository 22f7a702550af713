//! Offline-first memo storage with server reconciliation.
//!
//! Each memo is kept locally as a pair of snapshots: what the user last
//! wrote and what the server last confirmed. [`sync::SyncOrchestrator`]
//! pushes the difference, merging with concurrent server edits through
//! [`merge::merge`].

pub mod clock;
pub mod config;
pub mod db;
pub mod events;
pub mod merge;
pub mod models;
pub mod server;
pub mod sync;
