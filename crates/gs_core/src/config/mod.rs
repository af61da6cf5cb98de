//! Store identifier resolution and the provisioning record.
//!
//! Resolution order for the identifier is: explicit override, then the environment, then the
//! persisted record. Failing every source is a normal outcome (`None`), never an error.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::domain::StoreId;
use crate::error::AppError;
use crate::kv::{KvStore, Record};

pub const DEFAULT_CONFIG_FILE: &str = "file_search_config.json";
pub const DEFAULT_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEFAULT_STORE_NAME: &str = "GSPP-User-Guides";

pub const ENV_API_KEY: &str = "GEMINI_API_KEY";
pub const ENV_STORE_ID: &str = "GUIDESEARCH_STORE_ID";
pub const ENV_MODEL: &str = "GUIDESEARCH_MODEL";
pub const ENV_BASE_URL: &str = "GUIDESEARCH_BASE_URL";
pub const ENV_CONFIG_PATH: &str = "GUIDESEARCH_CONFIG";
pub const ENV_GENERATE_TIMEOUT: &str = "GUIDESEARCH_GENERATE_TIMEOUT_SECS";
pub const ENV_INDEXING_TIMEOUT: &str = "GUIDESEARCH_INDEXING_TIMEOUT_SECS";

const KEY_STORE_IDENTIFIER: &str = "store_identifier";

/// One uploaded document, as recorded after a successful provisioning run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DocumentRecord {
    pub path: String,
    pub display_name: String,
    pub size_bytes: u64,
    pub sha256: String,
}

/// The durable output of provisioning. Only `store_identifier` is needed by the query side.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct StoreConfig {
    pub store_identifier: StoreId,
    pub store_name: String,
    #[serde(default)]
    pub documents: Vec<DocumentRecord>,
    #[serde(default)]
    pub created_at: Option<String>, // RFC3339
}

impl StoreConfig {
    pub fn to_record(&self) -> Result<Record, AppError> {
        let value = serde_json::to_value(self).map_err(|e| {
            AppError::new("CONFIG_WRITE_FAILED", "Failed to encode store config")
                .with_details(e.to_string())
        })?;
        match value {
            Value::Object(map) => Ok(map.into_iter().collect()),
            _ => Err(AppError::new(
                "CONFIG_WRITE_FAILED",
                "Store config did not encode to a JSON object",
            )),
        }
    }

    pub fn from_record(record: Record) -> Result<Self, AppError> {
        let map: serde_json::Map<String, Value> = record.into_iter().collect();
        serde_json::from_value(Value::Object(map)).map_err(|e| {
            AppError::new("CONFIG_MALFORMED", "Store config record is incomplete or invalid")
                .with_details(e.to_string())
        })
    }
}

/// Overwrites whatever was persisted before.
pub fn save_store_config(kv: &dyn KvStore, config: &StoreConfig) -> Result<(), AppError> {
    let record = config.to_record()?;
    kv.replace(&record).map_err(|e| {
        let retryable = e.retryable;
        e.recode("CONFIG_WRITE_FAILED", "Failed to persist store config")
            .with_retryable(retryable)
    })?;
    tracing::info!(
        location = %kv.location(),
        store = %config.store_identifier,
        "store config saved"
    );
    Ok(())
}

/// Full provisioning record, for status reporting. `Ok(None)` when nothing was persisted.
pub fn load_store_config(kv: &dyn KvStore) -> Result<Option<StoreConfig>, AppError> {
    let record = kv
        .read()
        .map_err(|e| e.recode("CONFIG_READ_FAILED", "Failed to read store config"))?;
    match record {
        Some(record) => StoreConfig::from_record(record).map(Some),
        None => Ok(None),
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum StoreIdSource {
    Override,
    Environment,
    ConfigFile,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ResolvedStoreId {
    pub id: StoreId,
    pub source: StoreIdSource,
}

/// Resolves the store identifier without ever failing.
///
/// Blank override or environment values are treated as unset. An unreadable or malformed
/// persisted record is logged and treated as absent.
pub fn load_store_identifier(
    override_id: Option<&str>,
    env_id: Option<&str>,
    kv: &dyn KvStore,
) -> Option<ResolvedStoreId> {
    if let Some(id) = override_id.and_then(|v| StoreId::new(v).ok()) {
        return Some(ResolvedStoreId {
            id,
            source: StoreIdSource::Override,
        });
    }
    if let Some(id) = env_id.and_then(|v| StoreId::new(v).ok()) {
        return Some(ResolvedStoreId {
            id,
            source: StoreIdSource::Environment,
        });
    }

    let value = match kv.get(KEY_STORE_IDENTIFIER) {
        Ok(v) => v,
        Err(e) => {
            tracing::warn!(
                location = %kv.location(),
                code = %e.code,
                details = e.details.as_deref().unwrap_or(""),
                "ignoring unreadable store config"
            );
            return None;
        }
    };
    match value {
        Some(Value::String(s)) => StoreId::new(s).ok().map(|id| ResolvedStoreId {
            id,
            source: StoreIdSource::ConfigFile,
        }),
        Some(other) => {
            tracing::warn!(
                location = %kv.location(),
                found = %other,
                "store_identifier is not a string; ignoring"
            );
            None
        }
        None => None,
    }
}

/// Process-wide settings, resolved once at start from the environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub api_key: Option<String>,
    pub env_store_id: Option<String>,
    pub model: String,
    pub base_url: String,
    pub config_path: PathBuf,
    pub generate_timeout: Duration,
    pub upload_timeout: Duration,
    pub indexing_timeout: Duration,
    pub poll_interval: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            env_store_id: None,
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            config_path: PathBuf::from(DEFAULT_CONFIG_FILE),
            generate_timeout: Duration::from_secs(60),
            upload_timeout: Duration::from_secs(300),
            indexing_timeout: Duration::from_secs(900),
            poll_interval: Duration::from_secs(3),
        }
    }
}

impl Settings {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let defaults = Self::default();

        Self {
            api_key: get(ENV_API_KEY),
            env_store_id: get(ENV_STORE_ID),
            model: get(ENV_MODEL).unwrap_or(defaults.model),
            base_url: get(ENV_BASE_URL).unwrap_or(defaults.base_url),
            config_path: get(ENV_CONFIG_PATH)
                .map(PathBuf::from)
                .unwrap_or(defaults.config_path),
            generate_timeout: secs_or(
                ENV_GENERATE_TIMEOUT,
                get(ENV_GENERATE_TIMEOUT),
                defaults.generate_timeout,
            ),
            upload_timeout: defaults.upload_timeout,
            indexing_timeout: secs_or(
                ENV_INDEXING_TIMEOUT,
                get(ENV_INDEXING_TIMEOUT),
                defaults.indexing_timeout,
            ),
            poll_interval: defaults.poll_interval,
        }
    }

    pub fn require_api_key(&self) -> Result<&str, AppError> {
        self.api_key.as_deref().ok_or_else(|| {
            AppError::new("CONFIG_API_KEY_MISSING", "API key is not configured")
                .with_details(format!("set {ENV_API_KEY} in the environment or a .env file"))
        })
    }
}

fn secs_or(key: &str, raw: Option<String>, fallback: Duration) -> Duration {
    match raw {
        Some(v) => match v.parse::<u64>() {
            Ok(secs) if secs > 0 => Duration::from_secs(secs),
            _ => {
                tracing::warn!(key, value = %v, "invalid timeout; using default");
                fallback
            }
        },
        None => fallback,
    }
}
