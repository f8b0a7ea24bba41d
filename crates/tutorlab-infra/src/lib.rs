//! Infrastructure layer for tutorlab.
//!
//! Contains implementations of the repository traits defined in `tutorlab-core`:
//! SQLite storage, the OpenAI-compatible upstream client, password hashing,
//! configuration loading, and data directory layout.

pub mod config;
pub mod crypto;
pub mod filesystem;
pub mod sqlite;
pub mod upstream;
