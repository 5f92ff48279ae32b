use std::{collections::HashMap, sync::Mutex};

use rusqlite::{Connection, OptionalExtension, params};
use serde::{Serialize, de::DeserializeOwned};
use thiserror::Error;
use tracing::error;

/// Persisted widget array
pub const WIDGETS_KEY: &str = "dashboard_widgets";
/// Persisted grid-position array
pub const WIDGET_LAYOUTS_KEY: &str = "dashboard_widget_layouts";
/// Legacy single-layout map, kept readable for old installs
pub const LEGACY_LAYOUT_KEY: &str = "dashboard_layout";
/// Local fallback ring buffer for sensor events
pub const SENSOR_HISTORY_KEY: &str = "sensor_history";

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
}

/// Durable key-value store. Every payload is JSON-serialized by the caller.
pub trait Persistence: Send + Sync {
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn load(&self, key: &str) -> Result<Option<String>, StoreError>;
}

/// Fire-and-forget JSON write. Persistence failures are logged, never retried
/// and never surfaced to the caller.
pub fn save_json<T: Serialize>(store: &dyn Persistence, key: &str, value: &T) {
    let json = match serde_json::to_string(value) {
        Ok(json) => json,
        Err(e) => {
            error!("serializing `{key}`: {e}");
            return;
        }
    };
    if let Err(e) = store.save(key, &json) {
        error!("saving `{key}`: {e}");
    }
}

pub fn load_json<T: DeserializeOwned>(store: &dyn Persistence, key: &str) -> Option<T> {
    let json = match store.load(key) {
        Ok(v) => v?,
        Err(e) => {
            error!("loading `{key}`: {e}");
            return None;
        }
    };
    match serde_json::from_str(&json) {
        Ok(v) => Some(v),
        Err(e) => {
            error!("decoding `{key}`: {e}");
            None
        }
    }
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: &str) -> Result<Self, StoreError> {
        Self::setup(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::setup(Connection::open_in_memory()?)
    }

    fn setup(conn: Connection) -> Result<Self, StoreError> {
        conn.execute(
            "CREATE TABLE IF NOT EXISTS kv (key TEXT PRIMARY KEY, value TEXT NOT NULL)",
            [],
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl Persistence for SqliteStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO kv (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![key, value],
        )?;
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        let conn = self.conn.lock().unwrap();
        let value = conn
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }
}

/// In-memory substitute, used by tests and available to embedders
#[derive(Default)]
pub struct MemoryStore {
    map: Mutex<HashMap<String, String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Persistence for MemoryStore {
    fn save(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.map
            .lock()
            .unwrap()
            .insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn load(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self.map.lock().unwrap().get(key).cloned())
    }
}
