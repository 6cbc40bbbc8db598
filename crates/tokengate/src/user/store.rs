//! User store backends.
//!
//! The gateway only ever reads users through [`UserStore::lookup`]. The
//! JSON document format is shared by [`FileUserStore`] (read path, used while
//! serving) and [`UsersFile`] (read/write path, used by the CLI).

use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::UserRecord;

/// User store errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("corrupt user store: {0}")]
    Corrupt(String),

    #[error("user already exists: {0}")]
    AlreadyExists(String),

    #[error("user not found: {0}")]
    NotFound(String),
}

/// Read-only lookup of users by name.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Return the user named `username`, or `None` if there is none.
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, StoreError>;
}

/// On-disk document: `{"users": [...]}`.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct UsersFile {
    #[serde(default)]
    pub users: Vec<UserRecord>,
}

impl UsersFile {
    pub fn parse(raw: &str) -> Result<Self, StoreError> {
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(raw).map_err(|e| StoreError::Corrupt(e.to_string()))
    }

    /// Load from disk. A missing file is an empty store.
    pub fn load(path: &Path) -> Result<Self, StoreError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(Self::default()),
            Err(source) => Err(StoreError::Io {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Write to disk via a temporary file and rename.
    pub fn save(&self, path: &Path) -> Result<(), StoreError> {
        let io_err = |source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        };

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(io_err)?;
        }

        let body =
            serde_json::to_string_pretty(self).map_err(|e| StoreError::Corrupt(e.to_string()))?;
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(io_err)?;
        std::fs::rename(&tmp, path).map_err(io_err)
    }

    pub fn get(&self, username: &str) -> Option<&UserRecord> {
        self.users.iter().find(|u| u.username == username)
    }

    pub fn get_mut(&mut self, username: &str) -> Result<&mut UserRecord, StoreError> {
        self.users
            .iter_mut()
            .find(|u| u.username == username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))
    }

    pub fn insert(&mut self, record: UserRecord) -> Result<(), StoreError> {
        if self.get(&record.username).is_some() {
            return Err(StoreError::AlreadyExists(record.username));
        }
        self.users.push(record);
        Ok(())
    }

    pub fn remove(&mut self, username: &str) -> Result<UserRecord, StoreError> {
        let idx = self
            .users
            .iter()
            .position(|u| u.username == username)
            .ok_or_else(|| StoreError::NotFound(username.to_string()))?;
        Ok(self.users.remove(idx))
    }
}

/// JSON-file store, re-read on every lookup.
///
/// Nothing is cached, so a user removed from the file is gone for the next
/// request even while tokens naming them are still valid.
#[derive(Debug, Clone)]
pub struct FileUserStore {
    path: PathBuf,
}

impl FileUserStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl UserStore for FileUserStore {
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        let raw = match tokio::fs::read_to_string(&self.path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                warn!("user store {} does not exist", self.path.display());
                return Ok(None);
            }
            Err(source) => {
                return Err(StoreError::Io {
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let file = UsersFile::parse(&raw)?;
        let found = file.users.into_iter().find(|u| u.username == username);
        debug!("user lookup {}: found={}", username, found.is_some());
        Ok(found)
    }
}

/// Immutable in-memory store.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserStore {
    users: HashMap<String, UserRecord>,
}

impl MemoryUserStore {
    pub fn new(users: impl IntoIterator<Item = UserRecord>) -> Self {
        Self {
            users: users
                .into_iter()
                .map(|u| (u.username.clone(), u))
                .collect(),
        }
    }
}

#[async_trait]
impl UserStore for MemoryUserStore {
    async fn lookup(&self, username: &str) -> Result<Option<UserRecord>, StoreError> {
        Ok(self.users.get(username).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(name: &str) -> UserRecord {
        UserRecord::new(name, format!("$2b$04${name}"))
    }

    #[test]
    fn test_parse_empty_document() {
        assert!(UsersFile::parse("").unwrap().users.is_empty());
        assert!(UsersFile::parse("{}").unwrap().users.is_empty());
    }

    #[test]
    fn test_parse_corrupt_document() {
        let err = UsersFile::parse("{not json").unwrap_err();
        assert!(matches!(err, StoreError::Corrupt(_)));
    }

    #[test]
    fn test_insert_rejects_duplicates() {
        let mut file = UsersFile::default();
        file.insert(record("alice")).unwrap();
        let err = file.insert(record("alice")).unwrap_err();
        assert!(matches!(err, StoreError::AlreadyExists(name) if name == "alice"));
    }

    #[test]
    fn test_remove_and_get_mut() {
        let mut file = UsersFile::default();
        file.insert(record("alice")).unwrap();
        file.insert(record("bob")).unwrap();

        file.get_mut("bob")
            .unwrap()
            .attributes
            .insert("email".into(), "bob@x.io".into());
        assert_eq!(file.get("bob").unwrap().attributes["email"], "bob@x.io");

        let removed = file.remove("alice").unwrap();
        assert_eq!(removed.username, "alice");
        assert!(file.get("alice").is_none());
        assert!(matches!(file.remove("alice"), Err(StoreError::NotFound(_))));
        assert!(matches!(file.get_mut("carol"), Err(StoreError::NotFound(_))));
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("users.json");

        assert!(UsersFile::load(&path).unwrap().users.is_empty());

        let mut file = UsersFile::default();
        file.insert(record("alice").with_attribute("email", "a@x.io"))
            .unwrap();
        file.save(&path).unwrap();

        let loaded = UsersFile::load(&path).unwrap();
        assert_eq!(loaded.users.len(), 1);
        assert_eq!(loaded.get("alice").unwrap().attributes["email"], "a@x.io");
        assert!(!path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_file_store_lookup() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        let mut file = UsersFile::default();
        file.insert(record("alice")).unwrap();
        file.save(&path).unwrap();

        let store = FileUserStore::new(&path);
        assert_eq!(
            store.lookup("alice").await.unwrap().unwrap().username,
            "alice"
        );
        assert!(store.lookup("bob").await.unwrap().is_none());

        // Changes on disk are visible immediately.
        let mut file = UsersFile::load(&path).unwrap();
        file.remove("alice").unwrap();
        file.save(&path).unwrap();
        assert!(store.lookup("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_missing_file() {
        let dir = TempDir::new().unwrap();
        let store = FileUserStore::new(dir.path().join("absent.json"));
        assert!(store.lookup("alice").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_file_store_corrupt_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("users.json");
        std::fs::write(&path, "[[[").unwrap();
        let store = FileUserStore::new(&path);
        assert!(matches!(
            store.lookup("alice").await,
            Err(StoreError::Corrupt(_))
        ));
    }

    #[tokio::test]
    async fn test_memory_store_lookup() {
        let store = MemoryUserStore::new([record("alice"), record("bob")]);
        assert!(store.lookup("alice").await.unwrap().is_some());
        assert!(store.lookup("carol").await.unwrap().is_none());
    }
}
