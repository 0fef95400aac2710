//! Persistent local session storage.
//!
//! This module provides a thread-safe store for the device's session state.
//! At most one session record is held at a time, alongside per-account
//! trial-end remnants used for the reuse-cooldown check. The store persists
//! to JSON under the engine data directory.
//!
//! Mutators are write-through: the file is saved on every change, so every
//! exit path of the manager leaves durable state behind without a separate
//! flush step.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use anyhow::{Context, Result};
use seatlock_protocol::{AccountId, SessionRecord};
use serde::{Deserialize, Serialize};

/// File name the session store persists under inside the data dir.
pub const SESSION_STORE_FILE: &str = "session.json";

/// Wrapper for serializing the session store.
#[derive(Debug, Default, Serialize, Deserialize)]
struct StoreData {
    /// Version of the store format (for future migrations).
    version: u32,
    /// The active session, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session: Option<SessionRecord>,
    /// When the last trial session per account ended, unix millis.
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    trial_ends: HashMap<String, u64>,
}

#[derive(Debug, Default)]
struct StoreState {
    session: Option<SessionRecord>,
    trial_ends: HashMap<String, u64>,
}

/// Thread-safe persistent store for the local session.
///
/// The store uses a `RwLock` for concurrent access and persists to JSON
/// for durability across restarts.
pub struct SessionStore {
    /// The path to the JSON file.
    path: PathBuf,
    /// In-memory state, mirrored to disk on every mutation.
    state: RwLock<StoreState>,
}

impl SessionStore {
    /// Creates a session store that will persist to the given path.
    ///
    /// This does not load the file; call `load()` to read existing data.
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            state: RwLock::new(StoreState::default()),
        }
    }

    /// Creates a session store under the given data directory.
    pub fn in_dir<P: AsRef<Path>>(data_dir: P) -> Self {
        Self::new(data_dir.as_ref().join(SESSION_STORE_FILE))
    }

    /// Returns the path to the session store file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the store from the JSON file.
    ///
    /// If the file does not exist, the store starts empty. If the file
    /// exists but is invalid, returns an error; callers log it and treat
    /// the state as absent.
    pub fn load(&self) -> Result<()> {
        if !self.path.exists() {
            tracing::debug!(
                "Session store file not found at {:?}, starting empty",
                self.path
            );
            return Ok(());
        }

        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read session store: {}", self.path.display()))?;

        let data: StoreData = serde_json::from_str(&contents)
            .with_context(|| format!("Failed to parse session store: {}", self.path.display()))?;

        let mut state = self
            .state
            .write()
            .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;

        state.session = data.session;
        state.trial_ends = data.trial_ends;

        tracing::debug!(
            "Loaded session store from {:?} (active session: {})",
            self.path,
            state.session.is_some()
        );
        Ok(())
    }

    /// Returns the persisted session, if any.
    pub fn session(&self) -> Result<Option<SessionRecord>> {
        let state = self
            .state
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on session store"))?;

        Ok(state.session.clone())
    }

    /// Persists `record` as the active session, replacing any previous one.
    pub fn set_session(&self, record: SessionRecord) -> Result<()> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;
            state.session = Some(record);
        }
        self.save()
    }

    /// Removes the active session. A no-op when none is stored.
    pub fn clear_session(&self) -> Result<()> {
        let had_session = {
            let mut state = self
                .state
                .write()
                .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;
            state.session.take().is_some()
        };
        if had_session {
            self.save()?;
        }
        Ok(())
    }

    /// Records when a trial session for `account` ended.
    pub fn record_trial_end(&self, account: &AccountId, at_ms: u64) -> Result<()> {
        {
            let mut state = self
                .state
                .write()
                .map_err(|_| anyhow::anyhow!("Failed to acquire write lock on session store"))?;
            state.trial_ends.insert(account.as_str().to_string(), at_ms);
        }
        self.save()
    }

    /// When the last trial session for `account` ended, if known locally.
    pub fn last_trial_end(&self, account: &AccountId) -> Result<Option<u64>> {
        let state = self
            .state
            .read()
            .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on session store"))?;

        Ok(state.trial_ends.get(account.as_str()).copied())
    }

    /// Saves the store to the JSON file.
    ///
    /// Uses atomic write (write to temp file, then rename) to prevent
    /// corruption. Creates parent directories if they don't exist.
    fn save(&self) -> Result<()> {
        // Ensure parent directory exists
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!(
                    "Failed to create session store directory: {}",
                    parent.display()
                )
            })?;
        }

        let data = {
            let state = self
                .state
                .read()
                .map_err(|_| anyhow::anyhow!("Failed to acquire read lock on session store"))?;

            StoreData {
                version: 1,
                session: state.session.clone(),
                trial_ends: state.trial_ends.clone(),
            }
        };

        let contents =
            serde_json::to_string_pretty(&data).context("Failed to serialize session store")?;

        // Atomic write: write to temp file, then rename
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, &contents).with_context(|| {
            format!("Failed to write temp session store: {}", temp_path.display())
        })?;

        fs::rename(&temp_path, &self.path).with_context(|| {
            format!(
                "Failed to rename temp session store {} to {}",
                temp_path.display(),
                self.path.display()
            )
        })?;

        tracing::debug!("Saved session store to {:?}", self.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use seatlock_protocol::{DeviceId, SessionId};
    use tempfile::TempDir;

    fn test_record(account: &str) -> SessionRecord {
        SessionRecord {
            account_id: AccountId::new(account),
            session_id: SessionId::generate(),
            device_id: DeviceId::generate(),
            logged_in_at: 1_000_000,
            trial: false,
            trial_duration_ms: None,
        }
    }

    fn create_test_store(temp_dir: &TempDir) -> SessionStore {
        SessionStore::new(temp_dir.path().join(SESSION_STORE_FILE))
    }

    #[test]
    fn test_new_store_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        assert!(store.session().unwrap().is_none());
    }

    #[test]
    fn test_set_and_get_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let record = test_record("user@example.com");

        store.set_session(record.clone()).unwrap();
        let loaded = store.session().unwrap().unwrap();

        assert_eq!(loaded, record);
    }

    #[test]
    fn test_set_session_replaces_previous() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let first = test_record("first@example.com");
        let second = test_record("second@example.com");

        store.set_session(first).unwrap();
        store.set_session(second.clone()).unwrap();

        assert_eq!(store.session().unwrap().unwrap(), second);
    }

    #[test]
    fn test_clear_session() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.set_session(test_record("user@example.com")).unwrap();
        store.clear_session().unwrap();

        assert!(store.session().unwrap().is_none());
    }

    #[test]
    fn test_clear_session_is_idempotent() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        store.clear_session().unwrap();
        store.clear_session().unwrap();

        assert!(store.session().unwrap().is_none());
    }

    #[test]
    fn test_persistence_across_restarts() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_STORE_FILE);
        let record = test_record("persistent@example.com");

        // First "session"
        {
            let store = SessionStore::new(&path);
            store.set_session(record.clone()).unwrap();
        }

        assert!(path.exists());

        // Second "session" (simulating restart)
        {
            let store = SessionStore::new(&path);
            store.load().unwrap();
            assert_eq!(store.session().unwrap().unwrap(), record);
        }
    }

    #[test]
    fn test_load_nonexistent_file() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        // Should not error, just start empty
        store.load().unwrap();
        assert!(store.session().unwrap().is_none());
    }

    #[test]
    fn test_load_corrupt_file_errors() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_STORE_FILE);
        fs::write(&path, "not json at all {").unwrap();

        let store = SessionStore::new(&path);
        let result = store.load();

        assert!(result.is_err());
        let err = result.unwrap_err().to_string();
        assert!(err.contains("Failed to parse session store"));
    }

    #[test]
    fn test_atomic_write_leaves_no_temp_file() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_STORE_FILE);
        let temp_path = path.with_extension("json.tmp");

        let store = SessionStore::new(&path);
        store.set_session(test_record("user@example.com")).unwrap();

        assert!(!temp_path.exists());
        assert!(path.exists());
    }

    #[test]
    fn test_creates_parent_directories() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir
            .path()
            .join("nested")
            .join("dirs")
            .join(SESSION_STORE_FILE);

        let store = SessionStore::new(&path);
        store.set_session(test_record("user@example.com")).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_trial_end_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_STORE_FILE);
        let account = AccountId::new("trial@seatlock.dev");

        {
            let store = SessionStore::new(&path);
            store.record_trial_end(&account, 5_000_000).unwrap();
        }

        {
            let store = SessionStore::new(&path);
            store.load().unwrap();
            assert_eq!(store.last_trial_end(&account).unwrap(), Some(5_000_000));
        }
    }

    #[test]
    fn test_trial_end_unknown_account() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);

        let unknown = AccountId::new("nobody@example.com");
        assert_eq!(store.last_trial_end(&unknown).unwrap(), None);
    }

    #[test]
    fn test_trial_end_overwrites_older_value() {
        let temp_dir = TempDir::new().unwrap();
        let store = create_test_store(&temp_dir);
        let account = AccountId::new("trial@seatlock.dev");

        store.record_trial_end(&account, 1_000).unwrap();
        store.record_trial_end(&account, 2_000).unwrap();

        assert_eq!(store.last_trial_end(&account).unwrap(), Some(2_000));
    }

    #[test]
    fn test_store_data_version() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(SESSION_STORE_FILE);

        let store = SessionStore::new(&path);
        store.set_session(test_record("user@example.com")).unwrap();

        // Read the raw JSON and verify version
        let contents = fs::read_to_string(&path).unwrap();
        let data: serde_json::Value = serde_json::from_str(&contents).unwrap();
        assert_eq!(data["version"], 1);
    }

    #[test]
    fn test_concurrent_read_access() {
        use std::sync::Arc;
        use std::thread;

        let temp_dir = TempDir::new().unwrap();
        let store = Arc::new(create_test_store(&temp_dir));
        store.set_session(test_record("user@example.com")).unwrap();

        let handles: Vec<_> = (0..5)
            .map(|_| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    for _ in 0..100 {
                        assert!(store.session().unwrap().is_some());
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }
    }
}
