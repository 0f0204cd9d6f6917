//! Session expiry lifecycle.
//!
//! Expiry is evaluated on every inbound message, never by a background
//! sweeper. A session idle past the configured window reverts to Idle and
//! its flow is discarded before the message is interpreted.

use chrono::{DateTime, Utc};

use crate::session::Session;

/// Evaluates whether a session has sat idle long enough to expire.
#[derive(Debug, Clone, Copy)]
pub struct LifecyclePolicy {
    idle_minutes: Option<u32>,
}

impl LifecyclePolicy {
    /// `idle_minutes = None` disables expiry entirely.
    pub fn new(idle_minutes: Option<u32>) -> Self {
        Self { idle_minutes }
    }

    /// Returns the elapsed idle minutes if the session should expire.
    pub fn should_expire(&self, session: &Session, now: DateTime<Utc>) -> Option<i64> {
        let window = self.idle_minutes? as i64;
        let elapsed = session.idle_minutes(now);
        (elapsed >= window).then_some(elapsed)
    }
}
