//! Repository trait definitions (ports).
//!
//! These traits define the storage interface that the infrastructure layer
//! (tutorlab-infra) implements. The core crate never depends on any
//! specific storage technology.

pub mod message;
pub mod session;
pub mod sweep;
pub mod user;

pub use message::MessageRepository;
pub use session::SessionRepository;
pub use sweep::SweepRepository;
pub use user::UserRepository;
