//! Business logic services (use cases).
//!
//! Services orchestrate repository calls and business rules. They depend on
//! traits (ports) -- never on concrete infrastructure implementations.

pub mod auth;
pub mod hash;
pub mod progress;

pub use auth::{AuthService, SeedSummary};
pub use progress::ProgressService;
