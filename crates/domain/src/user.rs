//! User profile — the per-user record every handler reads.
//!
//! Profiles are created on first contact and mutated only through
//! profile-update actions. Deactivation is a flag, never a delete: the
//! invocation history keyed on the user id must stay resolvable.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

/// Birth data used by the calculation services. Each field is optional
/// until the user has gone through the corresponding profile flow.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BirthData {
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(default)]
    pub time: Option<NaiveTime>,
    #[serde(default)]
    pub place: Option<String>,
}

impl BirthData {
    /// True once all three components have been collected.
    pub fn is_complete(&self) -> bool {
        self.date.is_some() && self.time.is_some() && self.place.is_some()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubscriptionTier {
    #[default]
    Free,
    Plus,
    Premium,
}

/// A single user as tracked by the core.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    /// Stable channel address — also the session key.
    pub user_id: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default)]
    pub birth: BirthData,
    /// Free-form preferences (language, favored spread, …). The core stores
    /// them verbatim; interpretation belongs to handlers and rendering.
    #[serde(default)]
    pub preferences: HashMap<String, String>,
    #[serde(default)]
    pub tier: SubscriptionTier,
    #[serde(default = "d_true")]
    pub active: bool,
}

impl UserProfile {
    pub fn new(user_id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            user_id: user_id.into(),
            created_at: now,
            updated_at: now,
            birth: BirthData::default(),
            preferences: HashMap::new(),
            tier: SubscriptionTier::Free,
            active: true,
        }
    }

    /// Mark the profile inactive. Profiles are never removed.
    pub fn deactivate(&mut self) {
        self.active = false;
        self.updated_at = Utc::now();
    }
}

fn d_true() -> bool {
    true
}
