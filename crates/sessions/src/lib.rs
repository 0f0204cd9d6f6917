//! Session and profile state for Sibyl.
//!
//! Per-user conversational state (including any in-progress flow) lives
//! behind the `SessionRepository` trait with optimistic-concurrency saves;
//! user profiles behind `UserRepository`. Both ship an in-memory store that
//! optionally flushes to JSON under the configured state path.

pub mod lifecycle;
pub mod session;
pub mod store;
pub mod users;

pub use lifecycle::LifecyclePolicy;
pub use session::{ActiveFlow, CollectedField, Session, SessionState};
pub use store::{SessionRepository, SessionStore};
pub use users::{UserRepository, UserStore};
