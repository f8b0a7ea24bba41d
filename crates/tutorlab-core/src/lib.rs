//! Session engine logic and repository trait definitions for tutorlab.
//!
//! This crate defines the "ports" (repository traits, the upstream completion
//! trait, the clock) that the infrastructure layer implements, plus the
//! components built on them: `SessionDirectory`, `TurnLedger`, `ChatRelay`,
//! `ResetScheduler`, and the `ChatService` that wires a chat request through
//! all of them. It depends only on `tutorlab-types` -- never on
//! `tutorlab-infra` or any database/IO crate.

pub mod chat;
pub mod clock;
pub mod directory;
pub mod ledger;
pub mod relay;
pub mod repository;
pub mod scheduler;
pub mod service;
pub mod topic;

#[cfg(test)]
pub(crate) mod test_support;
