//! Saved grading sessions.
//!
//! Persistence goes through the [`KeyValueStore`] capability trait so the
//! session logic never knows where bytes live: the CLI and server use the
//! JSON-files-in-a-directory store, tests use the in-memory map, and any
//! future backend (Redis, S3) only has to implement four methods.
//!
//! Keys are namespaced under [`SESSION_PREFIX`] so a shared store can hold
//! other data without collisions. A corrupt entry is skipped and logged when
//! listing — one damaged record must never hide the rest of the history.

use crate::error::LabError;
use crate::report::GradingSession;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, warn};

/// Namespace prefix for session keys.
pub const SESSION_PREFIX: &str = "grading_session:";

/// Minimal key-value capability the session store is built on.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// All keys starting with `prefix`, in no particular order.
    async fn list(&self, prefix: &str) -> Result<Vec<String>, LabError>;
    async fn get(&self, key: &str) -> Result<Option<String>, LabError>;
    async fn set(&self, key: &str, value: &str) -> Result<(), LabError>;
    async fn delete(&self, key: &str) -> Result<(), LabError>;
}

/// High-level session operations over an injected [`KeyValueStore`].
#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn KeyValueStore>,
}

impl SessionStore {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        SessionStore { store }
    }

    /// Millisecond timestamp plus a short random suffix; sortable by
    /// creation time and unique enough for a per-teacher history.
    pub fn generate_session_id() -> String {
        let millis = chrono::Utc::now().timestamp_millis();
        let suffix: String = uuid::Uuid::new_v4().simple().to_string()[..9].to_string();
        format!("session_{millis}_{suffix}")
    }

    /// Persist a session; saving under an existing id overwrites it.
    pub async fn save_session(&self, session: &GradingSession) -> Result<(), LabError> {
        let key = format!("{SESSION_PREFIX}{}", session.id);
        let value = serde_json::to_string(session)
            .map_err(|e| LabError::Internal(format!("Could not encode session: {e}")))?;
        self.store.set(&key, &value).await?;
        debug!(id = %session.id, files = session.file_count, "session saved");
        Ok(())
    }

    /// All saved sessions, newest first. Corrupt entries are logged and
    /// skipped.
    pub async fn load_saved_sessions(&self) -> Result<Vec<GradingSession>, LabError> {
        let keys = self.store.list(SESSION_PREFIX).await?;
        let mut sessions = Vec::with_capacity(keys.len());
        for key in keys {
            let Some(raw) = self.store.get(&key).await? else {
                continue;
            };
            match serde_json::from_str::<GradingSession>(&raw) {
                Ok(session) => sessions.push(session),
                Err(e) => warn!(key = %key, error = %e, "skipping corrupt session entry"),
            }
        }
        sessions.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        Ok(sessions)
    }

    pub async fn load_session(&self, id: &str) -> Result<Option<GradingSession>, LabError> {
        let key = format!("{SESSION_PREFIX}{id}");
        match self.store.get(&key).await? {
            Some(raw) => serde_json::from_str(&raw)
                .map(Some)
                .map_err(|e| LabError::Internal(format!("Corrupt session '{id}': {e}"))),
            None => Ok(None),
        }
    }

    pub async fn delete_session(&self, id: &str) -> Result<(), LabError> {
        self.store.delete(&format!("{SESSION_PREFIX}{id}")).await
    }
}

/// In-memory store for tests and ephemeral runs.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, LabError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LabError> {
        let entries = self.entries.lock().expect("store lock poisoned");
        Ok(entries.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LabError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), LabError> {
        let mut entries = self.entries.lock().expect("store lock poisoned");
        entries.remove(key);
        Ok(())
    }
}

/// One JSON file per key inside a directory. Good enough for a single-host
/// deployment; the directory is created on first write.
pub struct DirStore {
    dir: PathBuf,
}

impl DirStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        DirStore { dir: dir.into() }
    }

    // Keys contain a single ':' namespace separator; encode it as "__",
    // which never occurs in generated keys, so the mapping inverts cleanly.
    fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.json", key.replace(':', "__")))
    }

    fn key_for(&self, path: &Path) -> Option<String> {
        let stem = path.file_stem()?.to_str()?;
        Some(stem.replacen("__", ":", 1))
    }
}

#[async_trait]
impl KeyValueStore for DirStore {
    async fn list(&self, prefix: &str) -> Result<Vec<String>, LabError> {
        let mut rd = match tokio::fs::read_dir(&self.dir).await {
            Ok(rd) => rd,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(LabError::Io {
                    path: self.dir.clone(),
                    source: e,
                })
            }
        };
        let mut keys = Vec::new();
        while let Ok(Some(entry)) = rd.next_entry().await {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(key) = self.key_for(&path) {
                if key.starts_with(prefix) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    async fn get(&self, key: &str) -> Result<Option<String>, LabError> {
        match tokio::fs::read_to_string(self.path_for(key)).await {
            Ok(raw) => Ok(Some(raw)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(LabError::Io {
                path: self.path_for(key),
                source: e,
            }),
        }
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), LabError> {
        tokio::fs::create_dir_all(&self.dir)
            .await
            .map_err(|e| LabError::Io {
                path: self.dir.clone(),
                source: e,
            })?;
        tokio::fs::write(self.path_for(key), value)
            .await
            .map_err(|e| LabError::Io {
                path: self.path_for(key),
                source: e,
            })
    }

    async fn delete(&self, key: &str) -> Result<(), LabError> {
        match tokio::fs::remove_file(self.path_for(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(LabError::Io {
                path: self.path_for(key),
                source: e,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppMode;
    use chrono::{Duration, Utc};

    fn session(id: &str, minutes_ago: i64) -> GradingSession {
        GradingSession {
            id: id.to_string(),
            name: format!("Run {id}"),
            experiment: "jafnvaegi".into(),
            timestamp: Utc::now() - Duration::minutes(minutes_ago),
            mode: AppMode::Teacher,
            results: vec![],
            file_count: 0,
        }
    }

    #[test]
    fn generated_ids_have_the_expected_shape() {
        let id = SessionStore::generate_session_id();
        assert!(id.starts_with("session_"), "got: {id}");
        let suffix = id.rsplit('_').next().unwrap();
        assert_eq!(suffix.len(), 9);
    }

    #[test]
    fn generated_ids_are_unique() {
        let a = SessionStore::generate_session_id();
        let b = SessionStore::generate_session_id();
        assert_ne!(a, b);
    }

    #[tokio::test]
    async fn save_load_delete_round_trip() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let s = session("session_1_aaaaaaaaa", 0);
        store.save_session(&s).await.unwrap();

        let loaded = store.load_session(&s.id).await.unwrap().unwrap();
        assert_eq!(loaded.id, s.id);
        assert_eq!(loaded.experiment, "jafnvaegi");

        store.delete_session(&s.id).await.unwrap();
        assert!(store.load_session(&s.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn sessions_list_newest_first() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        store.save_session(&session("old", 60)).await.unwrap();
        store.save_session(&session("newest", 0)).await.unwrap();
        store.save_session(&session("middle", 30)).await.unwrap();

        let sessions = store.load_saved_sessions().await.unwrap();
        let ids: Vec<&str> = sessions.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "middle", "old"]);
    }

    #[tokio::test]
    async fn corrupt_entry_is_skipped_not_fatal() {
        let kv = Arc::new(MemoryStore::new());
        kv.set(&format!("{SESSION_PREFIX}broken"), "{not json")
            .await
            .unwrap();
        let store = SessionStore::new(kv);
        store.save_session(&session("intact", 0)).await.unwrap();

        let sessions = store.load_saved_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "intact");
    }

    #[tokio::test]
    async fn saving_same_id_overwrites() {
        let store = SessionStore::new(Arc::new(MemoryStore::new()));
        let mut s = session("dup", 0);
        store.save_session(&s).await.unwrap();
        s.name = "renamed".into();
        store.save_session(&s).await.unwrap();

        let sessions = store.load_saved_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].name, "renamed");
    }

    #[tokio::test]
    async fn dir_store_round_trip_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = SessionStore::new(Arc::new(DirStore::new(dir.path())));

        let s = session("ondisk", 0);
        store.save_session(&s).await.unwrap();
        assert!(dir.path().join("grading_session__ondisk.json").exists());

        let sessions = store.load_saved_sessions().await.unwrap();
        assert_eq!(sessions.len(), 1);
        assert_eq!(sessions[0].id, "ondisk");

        store.delete_session("ondisk").await.unwrap();
        assert!(store.load_saved_sessions().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn dir_store_lists_empty_when_dir_missing() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("never-created");
        let store = DirStore::new(&missing);
        assert!(store.list(SESSION_PREFIX).await.unwrap().is_empty());
    }
}
