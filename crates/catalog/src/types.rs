use std::fmt;

use serde::{Deserialize, Serialize};

/// How far along a catalog entry's backing service is.
///
/// `Stub` and `Missing` entries stay visible to users (the menu is honest
/// about what exists) but never reach handler invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImplementationStatus {
    Implemented,
    Stub,
    Missing,
}

impl ImplementationStatus {
    pub fn is_implemented(&self) -> bool {
        matches!(self, ImplementationStatus::Implemented)
    }
}

impl fmt::Display for ImplementationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // `pad` keeps width flags working in table output.
        f.pad(match self {
            ImplementationStatus::Implemented => "implemented",
            ImplementationStatus::Stub => "stub",
            ImplementationStatus::Missing => "missing",
        })
    }
}

/// Validation rule for a single collected field.
///
/// The variants double as the TOML schema for `inputs[].validator`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FieldValidator {
    /// A calendar date in one of the accepted layouts. `past_only` rejects
    /// future dates (birth dates).
    Date {
        #[serde(default = "d_true")]
        past_only: bool,
    },
    /// Time of day, 24h `HH:MM` or `h:MM am/pm`.
    Time,
    /// Free-text place name: trimmed, must contain letters, bounded length.
    Place,
    /// Integer within an inclusive range.
    Number { min: i64, max: i64 },
    /// Case-insensitive match against a closed option set.
    Choice { options: Vec<String> },
    /// Trimmed non-empty free text.
    Text {
        #[serde(default = "d_text_max_len")]
        max_len: usize,
    },
}

fn d_true() -> bool {
    true
}

fn d_text_max_len() -> usize {
    280
}

/// One field an action needs before it can run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldSpec {
    pub name: String,
    pub prompt: String,
    pub validator: FieldValidator,
}

/// A single supported request, as declared in `catalog.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionDefinition {
    /// Unique key, stable across catalog revisions.
    pub id: String,
    /// Human-readable name, shown in the menu and in history.
    pub title: String,
    /// Recognized user-facing tokens. The first one is the canonical
    /// keyword and is what menu suggestions send back.
    pub tokens: Vec<String>,
    /// Ordered inputs collected before dispatch. Empty means the action
    /// runs immediately on recognition.
    #[serde(default)]
    pub inputs: Vec<FieldSpec>,
    /// Key into the handler registry.
    pub handler: String,
    pub status: ImplementationStatus,
    /// Whether this entry appears in the top-level menu.
    #[serde(default)]
    pub menu: bool,
    pub category: String,
}

impl ActionDefinition {
    /// The canonical keyword for this action.
    pub fn primary_token(&self) -> &str {
        self.tokens.first().map(String::as_str).unwrap_or(&self.id)
    }
}
