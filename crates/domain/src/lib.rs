//! Shared types for the Sibyl conversational core.
//!
//! Everything the other crates agree on lives here: the inbound/outbound
//! message envelopes, the user profile, the error taxonomy, configuration,
//! and structured trace events. This crate depends on no other workspace
//! crate.

pub mod config;
pub mod error;
pub mod message;
pub mod trace;
pub mod user;

pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use message::{InboundMessage, Reply};
pub use trace::TraceEvent;
pub use user::{BirthData, SubscriptionTier, UserProfile};
