//! User profile store.
//!
//! Profiles are created on first contact and kept forever; deactivation
//! flips the `active` flag instead of deleting. Persisted in `users.json`
//! under the configured state path, same flush discipline as the session
//! store.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use sibyl_domain::error::{Error, Result};
use sibyl_domain::user::UserProfile;

/// Storage contract for user profiles.
pub trait UserRepository: Send + Sync {
    /// Fetch the profile, creating it on first contact.
    fn ensure(&self, user_id: &str) -> Result<UserProfile>;
    fn get(&self, user_id: &str) -> Result<Option<UserProfile>>;
    fn update(&self, profile: &UserProfile) -> Result<()>;
    fn deactivate(&self, user_id: &str) -> Result<()>;
}

/// Profile store backed by an optional JSON file.
pub struct UserStore {
    users: RwLock<HashMap<String, UserProfile>>,
    users_path: Option<PathBuf>,
}

impl UserStore {
    /// Load or create the store at `state_path/users/users.json`.
    pub fn open(state_path: &Path) -> Result<Self> {
        let dir = state_path.join("users");
        std::fs::create_dir_all(&dir).map_err(Error::Io)?;

        let users_path = dir.join("users.json");
        let users: HashMap<String, UserProfile> = if users_path.exists() {
            let raw = std::fs::read_to_string(&users_path).map_err(Error::Io)?;
            serde_json::from_str(&raw).unwrap_or_default()
        } else {
            HashMap::new()
        };

        tracing::info!(
            users = users.len(),
            path = %users_path.display(),
            "user store loaded"
        );

        Ok(Self {
            users: RwLock::new(users),
            users_path: Some(users_path),
        })
    }

    /// A store that never touches disk.
    pub fn in_memory() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            users_path: None,
        }
    }

    fn flush_locked(&self, users: &HashMap<String, UserProfile>) -> Result<()> {
        let Some(path) = &self.users_path else {
            return Ok(());
        };
        let json = serde_json::to_string_pretty(users)
            .map_err(|e| Error::Persistence(format!("serializing users: {e}")))?;
        std::fs::write(path, json).map_err(Error::Io)?;
        Ok(())
    }
}

impl UserRepository for UserStore {
    fn ensure(&self, user_id: &str) -> Result<UserProfile> {
        // Fast path: profile already exists.
        {
            let users = self.users.read();
            if let Some(profile) = users.get(user_id) {
                return Ok(profile.clone());
            }
        }

        let profile = UserProfile::new(user_id);
        let mut users = self.users.write();
        let profile = users
            .entry(user_id.to_owned())
            .or_insert_with(|| {
                tracing::info!(user_id, "new user profile created");
                profile
            })
            .clone();
        self.flush_locked(&users)?;
        Ok(profile)
    }

    fn get(&self, user_id: &str) -> Result<Option<UserProfile>> {
        Ok(self.users.read().get(user_id).cloned())
    }

    fn update(&self, profile: &UserProfile) -> Result<()> {
        let mut users = self.users.write();
        users.insert(profile.user_id.clone(), profile.clone());
        self.flush_locked(&users)
    }

    fn deactivate(&self, user_id: &str) -> Result<()> {
        let mut users = self.users.write();
        if let Some(profile) = users.get_mut(user_id) {
            profile.deactivate();
            tracing::info!(user_id, "user profile deactivated");
        }
        self.flush_locked(&users)
    }
}
