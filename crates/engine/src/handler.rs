//! The handler seam — where calculation services plug in.
//!
//! A handler is an opaque unit of computation registered under a string key.
//! The catalog maps actions to keys; the registry maps keys to handlers.
//! Handlers are synchronous and CPU-shaped (ephemeris math, chart lookups),
//! so the dispatcher runs them on the blocking pool with a deadline.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use sibyl_catalog::FieldValue;
use sibyl_domain::error::Result;
use sibyl_domain::user::UserProfile;
use sibyl_sessions::CollectedField;

use crate::cancel::CancelToken;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Input / output envelopes
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// The validated inputs a handler receives for one invocation.
#[derive(Debug, Clone)]
pub struct ActionInput {
    pub action_id: String,
    pub user_id: String,
    /// Validated field values in the order the catalog declares them.
    pub fields: Vec<CollectedField>,
}

impl ActionInput {
    pub fn new(action_id: &str, user_id: &str, fields: Vec<CollectedField>) -> Self {
        Self {
            action_id: action_id.to_owned(),
            user_id: user_id.to_owned(),
            fields,
        }
    }

    /// Look up a collected field by its catalog name.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .find(|field| field.name == name)
            .map(|field| &field.value)
    }
}

/// Per-invocation context handed to a handler alongside its input.
#[derive(Clone)]
pub struct HandlerContext {
    /// Snapshot of the requesting user's profile at dispatch time.
    pub profile: UserProfile,
    /// Signalled when the execution budget elapses; long loops should poll.
    pub cancel: CancelToken,
}

/// What a handler produces for the user.
#[derive(Debug, Clone)]
pub struct HandlerOutput {
    pub text: String,
    /// Optional quick-reply options for the channel to render.
    pub suggested_replies: Vec<String>,
}

impl HandlerOutput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            suggested_replies: Vec::new(),
        }
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.suggested_replies = suggestions;
        self
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Handler trait + registry
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// One calculation service. Implementations must be cheap to share across
/// invocations; per-invocation state arrives through the context and input.
pub trait ActionHandler: Send + Sync {
    fn execute(&self, ctx: &HandlerContext, input: &ActionInput) -> Result<HandlerOutput>;
}

/// Key → handler lookup, built once at startup and immutable afterwards.
///
/// Registration is not exposed at runtime: adding a service means adding a
/// catalog entry and registering its handler at boot, then restarting.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler under its key. Last registration wins; a duplicate
    /// key is a wiring mistake worth surfacing in the log.
    pub fn register(&mut self, key: &str, handler: Arc<dyn ActionHandler>) {
        if self.handlers.insert(key.to_owned(), handler).is_some() {
            tracing::warn!(key, "handler key registered twice, keeping the later one");
        }
    }

    pub fn get(&self, key: &str) -> Option<Arc<dyn ActionHandler>> {
        self.handlers.get(key).cloned()
    }

    /// The set of registered keys, for catalog cross-checking.
    pub fn keys(&self) -> HashSet<String> {
        self.handlers.keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
