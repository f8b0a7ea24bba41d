//! Shared domain types for tutorlab.
//!
//! Participants, daily sessions, the append-only message log, sweep
//! bookkeeping, configuration, and the error taxonomy shared by every layer.
//!
//! Zero infrastructure dependencies -- only serde, chrono, thiserror.

pub mod config;
pub mod error;
pub mod llm;
pub mod message;
pub mod session;
pub mod sweep;
pub mod topic;
pub mod user;
