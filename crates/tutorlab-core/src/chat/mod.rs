//! Chat request orchestration.
//!
//! `ChatService` drives one `/chat` request through the directory, the quota
//! gate, the ledger, and the relay, and spawns the task that persists the
//! tutor reply once the relay completes.

pub mod service;

pub use service::{ChatRequest, ChatService, ChatStream};
