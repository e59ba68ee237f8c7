//! Key-value storage collaborators.
//!
//! The synchronized scope is backed by SQLite, the local-only scope by a
//! single JSON document. Both speak the same [`KeyValueStore`] trait so the
//! tile store and theme engine never know which one they are talking to.

use rusqlite::{params, Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tracing::warn;

pub const ACCENT_COLOR_KEY: &str = "accentColor";
pub const TILES_KEY: &str = "tiles";

#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("storage io: {0}")]
    Io(#[from] std::io::Error),
    #[error("storage serde: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("storage db: {0}")]
    Db(#[from] rusqlite::Error),
    #[error("storage rejected request: {0}")]
    Rejected(String),
    #[error("could not resolve a data directory")]
    ProjectDir,
}

/// Which persistence boundary a session is bound to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StorageScope {
    /// Shared across browser windows; used by the coordinator and popup.
    Sync,
    /// Only visible to the new-tab page itself.
    Local,
}

impl StorageScope {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageScope::Sync => "sync",
            StorageScope::Local => "local",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "sync" => Some(StorageScope::Sync),
            "local" => Some(StorageScope::Local),
            _ => None,
        }
    }
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError>;
    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError>;
}

const SCHEMA_VERSION: i64 = 1;

/// Synchronized settings store: a `kv` table holding JSON-encoded values.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA busy_timeout = 5000;",
        )?;
        Self::with_connection(conn)
    }

    pub fn new_in_memory() -> Result<Self, StorageError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StorageError> {
        init_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn schema_version(&self) -> Result<i64, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(|err| err.into_inner());
        Ok(conn.pragma_query_value(None, "user_version", |row| row.get(0))?)
    }
}

fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS kv (
            key TEXT PRIMARY KEY,
            value TEXT NOT NULL,
            updated_at INTEGER DEFAULT (strftime('%s','now'))
        );",
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)
}

impl KeyValueStore for SqliteStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let conn = self.conn.lock().unwrap_or_else(|err| err.into_inner());
        let raw: Option<String> = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let raw = serde_json::to_string(value)?;
        let conn = self.conn.lock().unwrap_or_else(|err| err.into_inner());
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value,
                updated_at = strftime('%s','now')",
            params![key, raw],
        )?;
        Ok(())
    }
}

/// Local-only store: every key lives in one JSON object on disk.
pub struct JsonFileStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<Map<String, Value>, StorageError> {
        if !self.path.exists() {
            return Ok(Map::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Map::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    /// Document to write into. A torn or hand-edited file is replaced rather
    /// than blocking every later write.
    fn load_for_write(&self) -> Result<Map<String, Value>, StorageError> {
        match self.load() {
            Err(StorageError::Serde(err)) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "local store unparsable, starting fresh"
                );
                Ok(Map::new())
            }
            other => other,
        }
    }

    fn save(&self, document: &Map<String, Value>) -> Result<(), StorageError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(document)?;
        let temp_path = self.path.with_extension("json.tmp");
        fs::write(&temp_path, data)?;
        if let Err(err) = fs::rename(&temp_path, &self.path) {
            let _ = fs::remove_file(&temp_path);
            return Err(err.into());
        }
        Ok(())
    }
}

impl KeyValueStore for JsonFileStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|err| err.into_inner());
        Ok(self.load()?.remove(key))
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        let _guard = self.lock.lock().unwrap_or_else(|err| err.into_inner());
        let mut document = self.load_for_write()?;
        document.insert(key.to_string(), value.clone());
        self.save(&document)
    }
}

/// In-process store. Writes can be made to fail to exercise the
/// storage-failure path.
#[derive(Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, Value>>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Value>, StorageError> {
        let values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        Ok(values.get(key).cloned())
    }

    fn set(&self, key: &str, value: &Value) -> Result<(), StorageError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StorageError::Rejected(format!("write to {key} refused")));
        }
        let mut values = self.values.lock().unwrap_or_else(|err| err.into_inner());
        values.insert(key.to_string(), value.clone());
        Ok(())
    }
}
