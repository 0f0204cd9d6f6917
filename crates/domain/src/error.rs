use serde::{Deserialize, Serialize};

/// Shared error type used across all Sibyl crates.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("catalog: {0}")]
    Catalog(String),

    #[error("config: {0}")]
    Config(String),

    #[error("persistence: {0}")]
    Persistence(String),

    #[error("version conflict for user {user_id}: expected v{expected}, store has v{found}")]
    VersionConflict {
        user_id: String,
        expected: u64,
        found: u64,
    },

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Turn-outcome taxonomy.
///
/// This is not the plumbing error above: a turn that ends in one of these
/// kinds still produced a user-visible reply. The kind is retained in the
/// invocation log and trace output for diagnosis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Token matched nothing in the catalog — user is shown the menu.
    UnrecognizedAction,
    /// A field value failed its validator — user is re-prompted.
    ValidationError,
    /// Retry budget for a field spent — flow aborted.
    ValidationExhausted,
    /// Catalog entry is stubbed or missing — feature reported unavailable.
    HandlerMissing,
    /// The handler returned an error.
    CalculationFailure,
    /// The handler exceeded its execution budget.
    Timeout,
    /// Optimistic-concurrency collision survived the single retry.
    SessionConflict,
    /// A repository was unavailable mid-turn.
    PersistenceFailure,
}

impl ErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnrecognizedAction => "unrecognized_action",
            Self::ValidationError => "validation_error",
            Self::ValidationExhausted => "validation_exhausted",
            Self::HandlerMissing => "handler_missing",
            Self::CalculationFailure => "calculation_failure",
            Self::Timeout => "timeout",
            Self::SessionConflict => "session_conflict",
            Self::PersistenceFailure => "persistence_failure",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
