//! Cryptographic helpers for tutorlab.
//!
//! - `hash`: SHA-256 password hashing

pub mod hash;
