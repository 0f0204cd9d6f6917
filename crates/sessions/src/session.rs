//! Per-user conversational state.
//!
//! One `Session` per user, keyed by the stable channel address. The session
//! carries at most one active flow and a monotonically increasing `version`
//! used for optimistic-concurrency saves.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use sibyl_catalog::FieldValue;

/// Where a session currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// No conversation in progress; any token starts one.
    Idle,
    /// A flow is open and the next message answers its current field.
    AwaitingInput,
    /// A handler is running for this user.
    Executing,
    /// Stored state referenced something that no longer exists (for example
    /// a flow for an action removed from the catalog). Recovered by
    /// resetting to Idle on the next message.
    Error,
}

/// One field captured so far by an active flow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CollectedField {
    pub name: String,
    pub value: FieldValue,
}

/// An in-progress multi-turn collection for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveFlow {
    pub action_id: String,
    /// Validated values in declaration order.
    #[serde(default)]
    pub collected: Vec<CollectedField>,
    /// Index of the field the user is being asked for.
    #[serde(default)]
    pub next_field: usize,
    /// Invalid submissions for the current field so far.
    #[serde(default)]
    pub attempts: u32,
    pub opened_at: DateTime<Utc>,
}

impl ActiveFlow {
    pub fn new(action_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            action_id: action_id.to_owned(),
            collected: Vec::new(),
            next_field: 0,
            attempts: 0,
            opened_at: now,
        }
    }

    /// Record an accepted value and move to the next field.
    pub fn accept(&mut self, name: &str, value: FieldValue) {
        self.collected.push(CollectedField {
            name: name.to_owned(),
            value,
        });
        self.next_field += 1;
        self.attempts = 0;
    }
}

/// Per-user conversational state. Created lazily on first contact.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub user_id: String,
    pub state: SessionState,
    #[serde(default)]
    pub flow: Option<ActiveFlow>,
    /// Bumped by the store on every successful save.
    #[serde(default)]
    pub version: u64,
    pub created_at: DateTime<Utc>,
    pub last_activity_at: DateTime<Utc>,
}

impl Session {
    pub fn new(user_id: &str, now: DateTime<Utc>) -> Self {
        Self {
            user_id: user_id.to_owned(),
            state: SessionState::Idle,
            flow: None,
            version: 0,
            created_at: now,
            last_activity_at: now,
        }
    }

    pub fn touch(&mut self, now: DateTime<Utc>) {
        self.last_activity_at = now;
    }

    /// Open a new flow, discarding any previous one.
    pub fn open_flow(&mut self, action_id: &str, now: DateTime<Utc>) {
        self.flow = Some(ActiveFlow::new(action_id, now));
        self.state = SessionState::AwaitingInput;
        self.last_activity_at = now;
    }

    /// Drop any flow and return to Idle.
    pub fn reset_to_idle(&mut self) {
        self.flow = None;
        self.state = SessionState::Idle;
    }

    pub fn idle_minutes(&self, now: DateTime<Utc>) -> i64 {
        now.signed_duration_since(self.last_activity_at).num_minutes()
    }
}
