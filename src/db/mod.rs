use crate::errors::{AppError, AppResult};
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use std::sync::Mutex;

const SCHEMA_SQL: &str = include_str!("schema.sql");

pub trait KeyValueBackend: Send + Sync {
    fn get(&self, key: &str) -> AppResult<Option<String>>;
    fn set(&self, key: &str, value: &str) -> AppResult<()>;
    fn remove(&self, key: &str) -> AppResult<()>;
}

#[derive(Debug)]
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }
}

impl KeyValueBackend for SqliteBackend {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        let conn = self.lock()?;
        let value = conn
            .query_row("SELECT value FROM kv_store WHERE key = ?1", [key], |row| {
                row.get::<_, String>(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO kv_store (key, value, updated_at)
             VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, Utc::now().to_rfc3339()],
        )?;
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute("DELETE FROM kv_store WHERE key = ?1", [key])?;
        Ok(())
    }
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    entries: Mutex<BTreeMap<String, String>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, BTreeMap<String, String>>> {
        self.entries
            .lock()
            .map_err(|_| AppError::Internal("memory store mutex poisoned".to_string()))
    }
}

impl KeyValueBackend for MemoryBackend {
    fn get(&self, key: &str) -> AppResult<Option<String>> {
        Ok(self.lock()?.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> AppResult<()> {
        self.lock()?.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&self, key: &str) -> AppResult<()> {
        self.lock()?.remove(key);
        Ok(())
    }
}

/// Outcome of a store read. Undecodable values count as `NotFound`.
#[derive(Debug)]
pub enum StoreRead<T> {
    Found(T),
    NotFound,
    StorageError(AppError),
}

impl<T> StoreRead<T> {
    pub fn into_option(self) -> Option<T> {
        match self {
            Self::Found(value) => Some(value),
            Self::NotFound | Self::StorageError(_) => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, Self::Found(_))
    }
}

pub struct RecordStore {
    backend: Box<dyn KeyValueBackend>,
    max_value_bytes: usize,
}

impl RecordStore {
    pub fn new(backend: Box<dyn KeyValueBackend>, max_value_bytes: usize) -> Self {
        Self {
            backend,
            max_value_bytes,
        }
    }

    pub fn open(path: &Path, max_value_bytes: usize) -> AppResult<Self> {
        Ok(Self::new(Box::new(SqliteBackend::new(path)?), max_value_bytes))
    }

    pub fn in_memory(max_value_bytes: usize) -> Self {
        Self::new(Box::new(MemoryBackend::new()), max_value_bytes)
    }

    pub fn read<T: DeserializeOwned>(&self, key: &str) -> StoreRead<T> {
        match self.read_raw(key) {
            StoreRead::Found(raw) => match serde_json::from_str::<T>(&raw) {
                Ok(value) => StoreRead::Found(value),
                Err(error) => {
                    tracing::warn!(key, error = %error, "stored value is not decodable; treating as absent");
                    StoreRead::NotFound
                }
            },
            StoreRead::NotFound => StoreRead::NotFound,
            StoreRead::StorageError(error) => StoreRead::StorageError(error),
        }
    }

    pub fn write<T: Serialize>(&self, key: &str, value: &T) -> AppResult<()> {
        let raw = serde_json::to_string(value)?;
        self.write_raw(key, &raw)
    }

    pub fn read_raw(&self, key: &str) -> StoreRead<String> {
        match self.backend.get(key) {
            Ok(Some(raw)) => StoreRead::Found(raw),
            Ok(None) => StoreRead::NotFound,
            Err(error) => {
                tracing::warn!(key, error = %error, "storage read failed");
                StoreRead::StorageError(error)
            }
        }
    }

    pub fn write_raw(&self, key: &str, value: &str) -> AppResult<()> {
        let size = key.len() + value.len();
        if size > self.max_value_bytes {
            return Err(AppError::QuotaExceeded {
                key: key.to_string(),
                size,
                limit: self.max_value_bytes,
            });
        }
        self.backend.set(key, value)
    }

    pub fn remove(&self, key: &str) -> AppResult<()> {
        self.backend.remove(key)
    }
}
