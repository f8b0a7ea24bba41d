//! HTTP/REST API layer for tutorlab.
//!
//! Axum-based API with bearer token authentication, envelope response
//! format, and CORS support. `/chat` streams raw upstream events.

pub mod error;
pub mod extractors;
pub mod handlers;
pub mod response;
pub mod router;
