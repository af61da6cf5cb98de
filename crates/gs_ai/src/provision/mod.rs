//! One-time store creation and document upload.
//!
//! The config record is written only after every document reports indexing complete, so a
//! failed run never leaves a config pointing at a partially indexed store.

use std::fmt;
use std::fs::File;
use std::io;
use std::path::Path;
use std::str::FromStr;
use std::thread;
use std::time::{Duration, Instant};

use gs_core::config::{save_store_config, DocumentRecord, StoreConfig};
use gs_core::domain::{DocumentRef, StoreId};
use gs_core::error::AppError;
use gs_core::kv::KvStore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::stores::{FileSearchStores, Operation, RemoteStore};

/// What to do when a remote store with the requested display name already exists.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ExistingStorePolicy {
    #[default]
    Fail,
    Reuse,
    Replace,
}

impl FromStr for ExistingStorePolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail" => Ok(Self::Fail),
            "reuse" => Ok(Self::Reuse),
            "replace" => Ok(Self::Replace),
            other => Err(AppError::new(
                "PROVISION_INVALID_INPUT",
                "Existing-store policy must be fail, reuse, or replace",
            )
            .with_details(format!("value={other}"))),
        }
    }
}

impl fmt::Display for ExistingStorePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Fail => "fail",
            Self::Reuse => "reuse",
            Self::Replace => "replace",
        })
    }
}

#[derive(Debug, Clone)]
pub struct ProvisionOptions {
    pub policy: ExistingStorePolicy,
    pub poll_interval: Duration,
    /// Per-document deadline for indexing to finish.
    pub indexing_timeout: Duration,
}

impl Default for ProvisionOptions {
    fn default() -> Self {
        Self {
            policy: ExistingStorePolicy::Fail,
            poll_interval: Duration::from_secs(3),
            indexing_timeout: Duration::from_secs(900),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisionOutcome {
    pub config: StoreConfig,
    /// True when an existing store was kept instead of uploading.
    pub reused: bool,
}

pub fn provision(
    service: &dyn FileSearchStores,
    kv: &dyn KvStore,
    documents: &[DocumentRef],
    store_name: &str,
    options: &ProvisionOptions,
) -> Result<ProvisionOutcome, AppError> {
    let store_name = store_name.trim();
    if store_name.is_empty() {
        return Err(AppError::new(
            "PROVISION_INVALID_INPUT",
            "Store name is required",
        ));
    }
    if documents.is_empty() {
        return Err(AppError::new(
            "PROVISION_INVALID_INPUT",
            "At least one document is required",
        ));
    }

    // Every path is checked before anything remote happens.
    let records = inspect_documents(documents)?;

    let (store_id, reused) = match find_existing(service, store_name) {
        Some(existing) => {
            let existing_id = StoreId::new(&existing.name)?;
            match options.policy {
                ExistingStorePolicy::Fail => {
                    return Err(AppError::new(
                        "PROVISION_STORE_EXISTS",
                        "A file search store with this name already exists",
                    )
                    .with_details(format!(
                        "store_name={store_name}; existing={existing_id}; rerun with reuse or replace"
                    )));
                }
                ExistingStorePolicy::Reuse => {
                    tracing::info!(store = %existing_id, "reusing existing store");
                    (existing_id, true)
                }
                ExistingStorePolicy::Replace => {
                    tracing::info!(store = %existing_id, "deleting existing store before re-provisioning");
                    service.delete_store(&existing_id, true)?;
                    (create_store(service, store_name)?, false)
                }
            }
        }
        None => (create_store(service, store_name)?, false),
    };

    if !reused {
        if let Err(e) = upload_all(service, &store_id, documents, options) {
            cleanup_store(service, &store_id);
            return Err(e);
        }
    }

    // A reused store was not filled by this run, so its contents are unknown here.
    let recorded = if reused { Vec::new() } else { records };
    let config = StoreConfig {
        store_identifier: store_id.clone(),
        store_name: store_name.to_string(),
        documents: recorded,
        created_at: Some(now_rfc3339()?),
    };
    save_store_config(kv, &config).map_err(|e| {
        let details = format!(
            "store={store_id}; {}",
            e.details.clone().unwrap_or_default()
        );
        AppError::new(
            "PROVISION_FAILED",
            "Documents are indexed but the store config could not be written",
        )
        .with_details(details)
    })?;

    tracing::info!(store = %store_id, documents = documents.len(), reused, "provisioning complete");
    Ok(ProvisionOutcome { config, reused })
}

fn inspect_documents(documents: &[DocumentRef]) -> Result<Vec<DocumentRecord>, AppError> {
    let missing: Vec<&Path> = documents
        .iter()
        .map(|d| d.path.as_path())
        .filter(|p| !p.is_file())
        .collect();
    if let Some(first) = missing.first() {
        let all = missing
            .iter()
            .map(|p| p.display().to_string())
            .collect::<Vec<_>>()
            .join("; ");
        return Err(AppError::new(
            "PROVISION_FILE_NOT_FOUND",
            format!("Document file not found: {}", first.display()),
        )
        .with_details(format!("missing={all}")));
    }

    let mut out = Vec::with_capacity(documents.len());
    for doc in documents {
        let (size_bytes, sha256) = hash_file(&doc.path)?;
        tracing::info!(
            document = %doc.display_name,
            path = %doc.path.display(),
            size_mb = %format!("{:.1}", size_bytes as f64 / (1024.0 * 1024.0)),
            "document found"
        );
        out.push(DocumentRecord {
            path: doc.path.display().to_string(),
            display_name: doc.display_name.clone(),
            size_bytes,
            sha256,
        });
    }
    Ok(out)
}

fn hash_file(path: &Path) -> Result<(u64, String), AppError> {
    let read_err = |e: io::Error| {
        AppError::new("PROVISION_FAILED", "Failed to read document")
            .with_details(format!("path={}; err={}", path.display(), e))
    };
    let mut file = File::open(path).map_err(read_err)?;
    let mut hasher = Sha256::new();
    let size = io::copy(&mut file, &mut hasher).map_err(read_err)?;
    Ok((size, hex::encode(hasher.finalize())))
}

fn find_existing(service: &dyn FileSearchStores, store_name: &str) -> Option<RemoteStore> {
    match service.list_stores() {
        Ok(stores) => stores
            .into_iter()
            .find(|s| s.display_name.as_deref() == Some(store_name)),
        Err(e) => {
            tracing::warn!(
                code = %e.code,
                details = e.details.as_deref().unwrap_or(""),
                "could not list existing stores; assuming none"
            );
            None
        }
    }
}

fn create_store(service: &dyn FileSearchStores, store_name: &str) -> Result<StoreId, AppError> {
    let created = service.create_store(store_name)?;
    let id = StoreId::new(&created.name).map_err(|e| {
        e.recode("PROVISION_FAILED", "Created store has no identifier")
    })?;
    tracing::info!(store = %id, store_name, "created file search store");
    Ok(id)
}

fn upload_all(
    service: &dyn FileSearchStores,
    store_id: &StoreId,
    documents: &[DocumentRef],
    options: &ProvisionOptions,
) -> Result<(), AppError> {
    for (i, doc) in documents.iter().enumerate() {
        tracing::info!(
            document = %doc.display_name,
            n = i + 1,
            of = documents.len(),
            "uploading"
        );
        let op = service
            .upload_document(store_id, &doc.path, &doc.display_name)
            .map_err(|e| document_error(e, doc, "Upload failed"))?;
        wait_for_indexing(service, op, doc, options)?;
        tracing::info!(document = %doc.display_name, "indexed");
    }
    Ok(())
}

fn wait_for_indexing(
    service: &dyn FileSearchStores,
    mut op: Operation,
    doc: &DocumentRef,
    options: &ProvisionOptions,
) -> Result<(), AppError> {
    let started = Instant::now();
    loop {
        if let Some(err) = op.error.as_ref() {
            return Err(AppError::new(
                "PROVISION_FAILED",
                format!("Indexing failed for '{}'", doc.display_name),
            )
            .with_details(format!(
                "path={}; operation={}; code={}; message={}",
                doc.path.display(),
                op.name,
                err.code,
                err.message
            )));
        }
        if op.done {
            return Ok(());
        }
        if op.name.is_empty() {
            return Err(AppError::new(
                "PROVISION_FAILED",
                format!("Upload of '{}' returned no operation to wait on", doc.display_name),
            )
            .with_details(format!("path={}", doc.path.display())));
        }
        if started.elapsed() >= options.indexing_timeout {
            return Err(AppError::new(
                "PROVISION_INDEXING_TIMEOUT",
                format!("Timed out waiting for '{}' to be indexed", doc.display_name),
            )
            .with_details(format!(
                "path={}; operation={}; waited_secs={}",
                doc.path.display(),
                op.name,
                started.elapsed().as_secs()
            ))
            .with_retryable(true));
        }

        thread::sleep(options.poll_interval);
        tracing::debug!(operation = %op.name, "polling indexing operation");
        op = service
            .get_operation(&op.name)
            .map_err(|e| document_error(e, doc, "Polling indexing status failed"))?;
    }
}

fn document_error(e: AppError, doc: &DocumentRef, what: &str) -> AppError {
    let retryable = e.retryable;
    let cause = e.details.unwrap_or_default();
    AppError::new(
        "PROVISION_FAILED",
        format!("{what} for '{}'", doc.display_name),
    )
    .with_details(format!(
        "path={}; cause={}: {}; {}",
        doc.path.display(),
        e.code,
        e.message,
        cause
    ))
    .with_retryable(retryable)
}

fn cleanup_store(service: &dyn FileSearchStores, store_id: &StoreId) {
    match service.delete_store(store_id, true) {
        Ok(()) => tracing::info!(store = %store_id, "removed partially provisioned store"),
        Err(e) => tracing::warn!(
            store = %store_id,
            code = %e.code,
            details = e.details.as_deref().unwrap_or(""),
            "failed to remove partially provisioned store"
        ),
    }
}

fn now_rfc3339() -> Result<String, AppError> {
    OffsetDateTime::now_utc().format(&Rfc3339).map_err(|e| {
        AppError::new("PROVISION_FAILED", "Failed to format time").with_details(e.to_string())
    })
}
