use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;

use super::{KvStore, Record};
use crate::error::AppError;

/// Keeps the record as rows of a single `kv` table, one JSON-encoded value per key.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
    location: String,
    read_only: bool,
}

impl SqliteStore {
    pub fn open(path: &Path) -> Result<Self, AppError> {
        let conn = Connection::open(path).map_err(|e| {
            AppError::new("KV_OPEN_FAILED", "Failed to open SQLite config store")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Self::init(conn, path.display().to_string())
    }

    pub fn open_in_memory() -> Result<Self, AppError> {
        let conn = Connection::open_in_memory().map_err(|e| {
            AppError::new("KV_OPEN_FAILED", "Failed to open in-memory SQLite config store")
                .with_details(e.to_string())
        })?;
        Self::init(conn, ":memory:".to_string())
    }

    /// Opens without creating anything. A missing file reads as empty; writes are rejected.
    pub fn open_read_only(path: &Path) -> Result<Self, AppError> {
        let opened = if path.exists() {
            Connection::open_with_flags(
                path,
                OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )
        } else {
            Connection::open_in_memory()
        };
        let conn = opened.map_err(|e| {
            AppError::new("KV_OPEN_FAILED", "Failed to open SQLite config store")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            location: path.display().to_string(),
            read_only: true,
        })
    }

    fn init(conn: Connection, location: String) -> Result<Self, AppError> {
        conn.execute_batch(
            r#"
      CREATE TABLE IF NOT EXISTS kv (
        key TEXT PRIMARY KEY NOT NULL,
        value TEXT NOT NULL
      );
    "#,
        )
        .map_err(|e| {
            AppError::new("KV_OPEN_FAILED", "Failed to ensure kv table exists")
                .with_details(e.to_string())
        })?;
        Ok(Self {
            conn: Mutex::new(conn),
            location,
            read_only: false,
        })
    }
}

impl KvStore for SqliteStore {
    fn read(&self) -> Result<Option<Record>, AppError> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| AppError::new("KV_READ_FAILED", "SQLite store lock poisoned"))?;
        let has_table: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = 'kv')",
                [],
                |row| row.get(0),
            )
            .map_err(|e| {
                AppError::new("KV_READ_FAILED", "Failed to inspect kv schema")
                    .with_details(e.to_string())
            })?;
        if !has_table {
            return Ok(None);
        }
        let mut stmt = conn
            .prepare("SELECT key, value FROM kv ORDER BY key")
            .map_err(|e| {
                AppError::new("KV_READ_FAILED", "Failed to prepare kv query")
                    .with_details(e.to_string())
            })?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .map_err(|e| {
                AppError::new("KV_READ_FAILED", "Failed to query kv rows").with_details(e.to_string())
            })?;

        let mut record = Record::new();
        for row in rows {
            let (key, raw) = row.map_err(|e| {
                AppError::new("KV_READ_FAILED", "Failed to read kv row").with_details(e.to_string())
            })?;
            let value: Value = serde_json::from_str(&raw).map_err(|e| {
                AppError::new("CONFIG_MALFORMED", "Stored kv value is not valid JSON")
                    .with_details(format!("key={key}; err={e}"))
            })?;
            record.insert(key, value);
        }

        if record.is_empty() {
            Ok(None)
        } else {
            Ok(Some(record))
        }
    }

    fn replace(&self, record: &Record) -> Result<(), AppError> {
        if self.read_only {
            return Err(AppError::new(
                "KV_WRITE_FAILED",
                "SQLite config store was opened read-only",
            )
            .with_details(format!("path={}", self.location)));
        }
        let mut conn = self
            .conn
            .lock()
            .map_err(|_| AppError::new("KV_WRITE_FAILED", "SQLite store lock poisoned"))?;
        let tx = conn.transaction().map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to begin kv transaction")
                .with_details(e.to_string())
        })?;
        tx.execute("DELETE FROM kv", []).map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to clear kv rows").with_details(e.to_string())
        })?;
        for (key, value) in record {
            let raw = serde_json::to_string(value).map_err(|e| {
                AppError::new("KV_WRITE_FAILED", "Failed to encode kv value")
                    .with_details(format!("key={key}; err={e}"))
            })?;
            tx.execute(
                "INSERT INTO kv (key, value) VALUES (?1, ?2)",
                params![key, raw],
            )
            .map_err(|e| {
                AppError::new("KV_WRITE_FAILED", "Failed to insert kv row")
                    .with_details(format!("key={key}; err={e}"))
            })?;
        }
        tx.commit().map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to commit kv transaction")
                .with_details(e.to_string())
        })?;
        Ok(())
    }

    fn location(&self) -> String {
        format!("sqlite:{}", self.location)
    }
}
