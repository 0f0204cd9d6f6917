//! Versioned session store.
//!
//! Persists one `Session` per user in `sessions.json` under the configured
//! state path (or purely in memory for tests and the REPL). Saves are
//! optimistic: the caller passes the version it loaded, and a mismatch means
//! someone else wrote first.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use sibyl_domain::error::{Error, Result};

use crate::session::Session;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Repository trait
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Storage contract for per-user sessions.
pub trait SessionRepository: Send + Sync {
    fn load(&self, user_id: &str) -> Result<Option<Session>>;

    /// Persist `session` if the stored version still equals
    /// `expected_version` (0 for a brand-new session). Returns the stored
    /// copy with its version bumped; `Error::VersionConflict` otherwise.
    fn save(&self, session: &Session, expected_version: u64) -> Result<Session>;
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Store
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Session store backed by an optional JSON file.
pub struct SessionStore {
    sessions: RwLock<HashMap<String, Session>>,
    sessions_path: Option<PathBuf>,
}

impl SessionStore {
    /// Load or create the store at `state_path/sessions/sessions.json`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("sessions");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let sessions_path = dir.join("sessions.json");
        let sessions: HashMap<String, Session> = if sessions_path.exists() {
            let raw = std::fs::read_to_string(&sessions_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            sessions = sessions.len(),
            path = %sessions_path.display(),
            "session store loaded"
        );

        Ok(Self {
            sessions: RwLock::new(sessions),
            sessions_path: Some(sessions_path),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            sessions_path: None,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.read().is_empty()
    }

    fn flush_locked(&self, sessions: &HashMap<String, Session>) -> Result<()> {
        let Some(path) = &self.sessions_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(sessions)
            .map_err(|e| Error::Persistence(format!("serializing sessions: {e}")))?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }
}

impl SessionRepository for SessionStore {
    fn load(&self, user_id: &str) -> Result<Option<Session>> {
        Ok(self.sessions.read().get(user_id).cloned())
    }

    fn save(&self, session: &Session, expected_version: u64) -> Result<Session> {
        let mut sessions = self.sessions.write();
        let found = sessions
            .get(&session.user_id)
            .map(|existing| existing.version)
            .unwrap_or(0);
        if found != expected_version {
            return Err(Error::VersionConflict {
                user_id: session.user_id.clone(),
                expected: expected_version,
                found,
            });
        }

        let mut stored = session.clone();
        stored.version = expected_version + 1;
        sessions.insert(stored.user_id.clone(), stored.clone());
        self.flush_locked(&sessions)?;
        Ok(stored)
    }
}
