//! Shared types for the tapback workspace.
//!
//! Everything here is a derived view of the Messages store: records are
//! rebuilt on every poll and never written back.

pub mod models;
pub mod time;

pub use models::{ChatSummary, DecodedMessage, MessageKind};
