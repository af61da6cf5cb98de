//! Small key-value persistence seam for the provisioning record.
//!
//! The provisioner writes one record at the end of a successful run and the config loader
//! reads it back. Backends only need to replace the whole record atomically.

use std::collections::BTreeMap;

use serde_json::Value;

use crate::error::AppError;

pub mod file;
pub mod memory;
pub mod sqlite;

pub use file::JsonFileStore;
pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub type Record = BTreeMap<String, Value>;

pub trait KvStore {
    /// `Ok(None)` when nothing has been persisted yet.
    fn read(&self) -> Result<Option<Record>, AppError>;

    /// Replaces any previous record in a single step.
    fn replace(&self, record: &Record) -> Result<(), AppError>;

    /// Human-readable location, used in logs and `status` output.
    fn location(&self) -> String;

    fn get(&self, key: &str) -> Result<Option<Value>, AppError> {
        Ok(self.read()?.and_then(|mut r| r.remove(key)))
    }
}
