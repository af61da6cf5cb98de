use std::path::Path;

use gs_core::domain::StoreId;
use gs_core::error::AppError;
use serde::{Deserialize, Serialize};

pub mod gemini_stores;

pub use gemini_stores::GeminiStores;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RemoteStore {
    pub name: String,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub create_time: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct OperationError {
    #[serde(default)]
    pub code: i64,
    #[serde(default)]
    pub message: String,
}

/// Long-running upload/indexing operation as reported by the vendor.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Operation {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub done: bool,
    #[serde(default)]
    pub error: Option<OperationError>,
}

/// Remote store management consumed by the provisioner.
pub trait FileSearchStores {
    fn create_store(&self, display_name: &str) -> Result<RemoteStore, AppError>;

    /// All stores visible to the credential, following pagination.
    fn list_stores(&self) -> Result<Vec<RemoteStore>, AppError>;

    fn delete_store(&self, store: &StoreId, force: bool) -> Result<(), AppError>;

    /// Uploads one local file; indexing continues asynchronously behind the returned operation.
    fn upload_document(
        &self,
        store: &StoreId,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation, AppError>;

    fn get_operation(&self, name: &str) -> Result<Operation, AppError>;
}
