//! HTTP request handlers.

pub mod admin;
pub mod auth;
pub mod chat;
pub mod progress;
pub mod topics;
