use std::fs;
use std::path::{Path, PathBuf};

use serde_json::Value;

use super::{KvStore, Record};
use crate::error::AppError;

/// Stores the record as a pretty-printed UTF-8 JSON object.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }
}

impl KvStore for JsonFileStore {
    fn read(&self) -> Result<Option<Record>, AppError> {
        let path = self.path.as_path();
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(path).map_err(|e| {
            AppError::new("KV_READ_FAILED", "Failed to read config file")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let value: Value = serde_json::from_slice(&bytes).map_err(|e| {
            AppError::new("CONFIG_MALFORMED", "Config file is not valid JSON")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        match value {
            Value::Object(map) => Ok(Some(map.into_iter().collect())),
            other => Err(
                AppError::new("CONFIG_MALFORMED", "Config file must contain a JSON object")
                    .with_details(format!("path={}; found={}", path.display(), kind_of(&other))),
            ),
        }
    }

    fn replace(&self, record: &Record) -> Result<(), AppError> {
        let path = self.path.as_path();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AppError::new("KV_WRITE_FAILED", "Failed to create config directory")
                    .with_details(format!("path={}; err={}", parent.display(), e))
            })?;
        }

        let tmp = path.with_extension("tmp");
        let json = serde_json::to_string_pretty(record).map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to encode config record")
                .with_details(e.to_string())
        })?;
        fs::write(&tmp, json.as_bytes()).map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to write config file")
                .with_details(format!("path={}; err={}", tmp.display(), e))
        })?;
        fs::rename(&tmp, path).map_err(|e| {
            AppError::new("KV_WRITE_FAILED", "Failed to finalize config file write")
                .with_details(format!("tmp={}; dest={}; err={}", tmp.display(), path.display(), e))
        })?;
        Ok(())
    }

    fn location(&self) -> String {
        self.path.display().to_string()
    }
}

fn kind_of(v: &Value) -> &'static str {
    match v {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
