use std::collections::HashMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::config::DbConfig;
use rusqlite::{params, Connection, OptionalExtension};
use thiserror::Error;
use time::OffsetDateTime;

use crate::config::StorageOptions;
use crate::storage::schema;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("quota exceeded: {needed} bytes needed, capacity is {capacity} bytes")]
    QuotaExceeded { needed: usize, capacity: usize },
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("storage unavailable: {0}")]
    Unavailable(String),
}

/// Byte-oriented key-value storage, the moral equivalent of browser local storage.
/// Every write replaces the whole value for its key.
pub trait KeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError>;
    fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError>;
}

#[derive(Clone)]
pub struct SqliteKeyValueStore {
    db_path: Arc<PathBuf>,
    wal_autocheckpoint: u32,
    capacity: Option<usize>,
}

impl SqliteKeyValueStore {
    pub fn open(options: &StorageOptions) -> Result<Self> {
        let db_path = &options.database_path;
        if let Some(parent) = db_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("creating data directory {}", parent.display()))?;
        }
        let store = Self {
            db_path: Arc::new(db_path.clone()),
            wal_autocheckpoint: options.wal_autocheckpoint,
            capacity: options.capacity(),
        };
        let conn = store
            .connect()
            .with_context(|| format!("opening database {}", db_path.display()))?;
        schema::apply(&conn)?;
        tracing::debug!(path = %db_path.display(), capacity = ?store.capacity, "key-value store ready");
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, BackendError> {
        let conn = Connection::open(&*self.db_path)?;
        conn.set_db_config(DbConfig::SQLITE_DBCONFIG_ENABLE_FKEY, true)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;
        conn.pragma_update(
            None,
            "wal_autocheckpoint",
            self.wal_autocheckpoint.to_string(),
        )?;
        Ok(conn)
    }
}

impl KeyValueStore for SqliteKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        let conn = self.connect()?;
        let value = conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?1",
                params![key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let mut conn = self.connect()?;
        let tx = conn.transaction()?;
        if let Some(capacity) = self.capacity {
            let others: i64 = tx.query_row(
                "SELECT COALESCE(SUM(length(CAST(key AS BLOB)) + length(value)), 0)
                 FROM kv_store WHERE key != ?1",
                params![key],
                |row| row.get(0),
            )?;
            let needed = others.max(0) as usize + key.len() + value.len();
            if needed > capacity {
                return Err(BackendError::QuotaExceeded { needed, capacity });
            }
        }
        let now = OffsetDateTime::now_utc().unix_timestamp();
        tx.execute(
            "INSERT INTO kv_store (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        tx.commit()?;
        Ok(())
    }
}

/// Process-local store. Clones share the same map, so a test can keep a handle
/// to inspect or corrupt what the card store persisted.
#[derive(Clone, Default)]
pub struct MemoryKeyValueStore {
    inner: Arc<Mutex<MemoryInner>>,
}

#[derive(Default)]
struct MemoryInner {
    entries: HashMap<String, Vec<u8>>,
    capacity: Option<usize>,
    fail_writes: bool,
}

impl MemoryKeyValueStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let store = Self::default();
        store.inner.lock().capacity = Some(capacity);
        store
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.inner.lock().fail_writes = fail;
    }

    pub fn set_capacity(&self, capacity: Option<usize>) {
        self.inner.lock().capacity = capacity;
    }

    pub fn raw(&self, key: &str) -> Option<Vec<u8>> {
        self.inner.lock().entries.get(key).cloned()
    }

    pub fn put_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        self.inner
            .lock()
            .entries
            .insert(key.to_string(), value.into());
    }
}

impl KeyValueStore for MemoryKeyValueStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>, BackendError> {
        Ok(self.inner.lock().entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<(), BackendError> {
        let mut inner = self.inner.lock();
        if inner.fail_writes {
            return Err(BackendError::Unavailable("writes disabled".into()));
        }
        if let Some(capacity) = inner.capacity {
            let others: usize = inner
                .entries
                .iter()
                .filter(|(existing, _)| existing.as_str() != key)
                .map(|(existing, bytes)| existing.len() + bytes.len())
                .sum();
            let needed = others + key.len() + value.len();
            if needed > capacity {
                return Err(BackendError::QuotaExceeded { needed, capacity });
            }
        }
        inner.entries.insert(key.to_string(), value.to_vec());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use tempfile::TempDir;

    fn sqlite_store(temp: &TempDir, capacity_bytes: u64) -> Result<SqliteKeyValueStore> {
        let mut options = StorageOptions::default();
        options.database_path = temp.path().join("data/cards.db");
        options.capacity_bytes = capacity_bytes;
        SqliteKeyValueStore::open(&options)
    }

    #[test]
    fn sqlite_store_round_trips_and_overwrites() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = sqlite_store(&temp, 0)?;
        assert_eq!(store.get("cards")?, None);

        store.set("cards", b"[1]")?;
        store.set("cards", b"[1,2]")?;
        assert_eq!(store.get("cards")?.as_deref(), Some(&b"[1,2]"[..]));
        Ok(())
    }

    #[test]
    fn sqlite_store_enforces_capacity_and_keeps_previous_value() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let store = sqlite_store(&temp, 16)?;
        store.set("cards", b"small")?;

        let err = store.set("cards", &[b'x'; 64]).unwrap_err();
        assert_matches!(err, BackendError::QuotaExceeded { capacity: 16, .. });
        assert_eq!(store.get("cards")?.as_deref(), Some(&b"small"[..]));
        Ok(())
    }

    #[test]
    fn memory_store_counts_other_keys_against_capacity() {
        let store = MemoryKeyValueStore::with_capacity(20);
        store.set("a", b"0123456789").expect("fits");
        let err = store.set("b", b"0123456789").unwrap_err();
        assert_matches!(err, BackendError::QuotaExceeded { needed: 22, capacity: 20 });
        // replacing the same key only counts the new value
        store.set("a", b"0123456789abcdef").expect("replacement fits");
    }

    #[test]
    fn memory_store_failure_injection() {
        let store = MemoryKeyValueStore::new();
        store.set_fail_writes(true);
        assert_matches!(store.set("k", b"v"), Err(BackendError::Unavailable(_)));
        store.set_fail_writes(false);
        assert!(store.set("k", b"v").is_ok());
    }
}
