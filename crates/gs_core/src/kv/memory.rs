use std::sync::Mutex;

use super::{KvStore, Record};
use crate::error::AppError;

/// Process-local backend, handy for tests and for sessions that never touch disk.
#[derive(Debug, Default)]
pub struct MemoryStore {
    record: Mutex<Option<Record>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_record(record: Record) -> Self {
        Self {
            record: Mutex::new(Some(record)),
        }
    }
}

impl KvStore for MemoryStore {
    fn read(&self) -> Result<Option<Record>, AppError> {
        let guard = self
            .record
            .lock()
            .map_err(|_| AppError::new("KV_READ_FAILED", "In-memory store lock poisoned"))?;
        Ok(guard.clone())
    }

    fn replace(&self, record: &Record) -> Result<(), AppError> {
        let mut guard = self
            .record
            .lock()
            .map_err(|_| AppError::new("KV_WRITE_FAILED", "In-memory store lock poisoned"))?;
        *guard = Some(record.clone());
        Ok(())
    }

    fn location(&self) -> String {
        "memory".to_string()
    }
}
