//! crates/tutor_core/src/persistence.rs
//!
//! Saves and restores the learner's profile and learning path as one JSON pair on top
//! of any `KeyValueStore`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

use crate::domain::{LearningPath, UserProfile};
use crate::ports::{KeyValueStore, PortError, PortResult};

pub const PROFILE_KEY: &str = "user_profile";
pub const PATH_KEY: &str = "learning_path";

/// Persists the profile/path pair. Either both records load, or neither does.
#[derive(Clone)]
pub struct SessionRepository {
    store: Arc<dyn KeyValueStore>,
}

impl SessionRepository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    /// Loads the saved pair.
    ///
    /// A missing key or a record that no longer decodes yields `Ok(None)`, which means
    /// "start fresh". Only store failures are returned as errors.
    pub async fn load(&self) -> PortResult<Option<(UserProfile, LearningPath)>> {
        let profile_json = self.store.get(PROFILE_KEY).await?;
        let path_json = self.store.get(PATH_KEY).await?;

        let (Some(profile_json), Some(path_json)) = (profile_json, path_json) else {
            info!("No complete saved session found.");
            return Ok(None);
        };

        let profile = match serde_json::from_str::<UserProfile>(&profile_json) {
            Ok(profile) => profile,
            Err(e) => {
                warn!("Discarding saved profile that failed to decode: {}", e);
                return Ok(None);
            }
        };
        let path = match serde_json::from_str::<LearningPath>(&path_json) {
            Ok(path) => path,
            Err(e) => {
                warn!("Discarding saved learning path that failed to decode: {}", e);
                return Ok(None);
            }
        };

        Ok(Some((profile, path)))
    }

    pub async fn save(&self, profile: &UserProfile, path: &LearningPath) -> PortResult<()> {
        let profile_json =
            serde_json::to_string(profile).map_err(|e| PortError::Unexpected(e.to_string()))?;
        let path_json =
            serde_json::to_string(path).map_err(|e| PortError::Unexpected(e.to_string()))?;

        self.store
            .put_all(&[(PROFILE_KEY, profile_json), (PATH_KEY, path_json)])
            .await
    }

    pub async fn clear(&self) -> PortResult<()> {
        self.store.delete_all(&[PROFILE_KEY, PATH_KEY]).await
    }
}

//=========================================================================================
// In-Memory Store
//=========================================================================================

/// A `KeyValueStore` backed by a `HashMap`, for tests and ephemeral sessions.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> PortResult<std::sync::MutexGuard<'_, HashMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| PortError::Unexpected("memory store lock poisoned".to_string()))
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    async fn put_all(&self, entries: &[(&str, String)]) -> PortResult<()> {
        let mut map = self.lock()?;
        for (key, value) in entries {
            map.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn delete_all(&self, keys: &[&str]) -> PortResult<()> {
        let mut map = self.lock()?;
        for key in keys {
            map.remove(*key);
        }
        Ok(())
    }
}
