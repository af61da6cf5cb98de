use std::fs;
use std::path::Path;
use std::time::Duration;

use gs_core::domain::StoreId;
use gs_core::error::AppError;
use serde::{Deserialize, Serialize};

use super::{FileSearchStores, Operation, RemoteStore};
use crate::gemini::{call_error, read_json, GeminiClient};

const LIST_PAGE_SIZE: &str = "20";
// Guards against a server that keeps handing out page tokens.
const LIST_MAX_PAGES: usize = 50;

#[derive(Debug, Clone)]
pub struct GeminiStores {
    client: GeminiClient,
    request_timeout: Duration,
    upload_timeout: Duration,
}

impl GeminiStores {
    pub fn new(client: GeminiClient, upload_timeout: Duration) -> Self {
        Self {
            client,
            request_timeout: Duration::from_secs(30),
            upload_timeout,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateStoreRequest<'a> {
    display_name: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListStoresResponse {
    #[serde(default)]
    file_search_stores: Vec<RemoteStore>,
    #[serde(default)]
    next_page_token: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
struct UploadMetadata<'a> {
    display_name: &'a str,
    mime_type: &'a str,
}

impl FileSearchStores for GeminiStores {
    fn create_store(&self, display_name: &str) -> Result<RemoteStore, AppError> {
        let url = self.client.api_url("fileSearchStores");
        let resp = self
            .client
            .request("POST", &url, self.request_timeout)
            .send_json(CreateStoreRequest { display_name })
            .map_err(|e| call_error("PROVISION_FAILED", "Failed to create file search store", e))?;
        let store: RemoteStore = read_json(
            "PROVISION_FAILED",
            "Failed to create file search store",
            resp,
        )?;
        if store.name.trim().is_empty() {
            return Err(AppError::new(
                "PROVISION_FAILED",
                "Created store has no name",
            ));
        }
        Ok(store)
    }

    fn list_stores(&self) -> Result<Vec<RemoteStore>, AppError> {
        let url = self.client.api_url("fileSearchStores");
        let mut out = Vec::new();
        let mut page_token: Option<String> = None;

        for _ in 0..LIST_MAX_PAGES {
            let mut req = self
                .client
                .request("GET", &url, self.request_timeout)
                .query("pageSize", LIST_PAGE_SIZE);
            if let Some(token) = page_token.as_deref() {
                req = req.query("pageToken", token);
            }
            let resp = req
                .call()
                .map_err(|e| call_error("PROVISION_FAILED", "Failed to list file search stores", e))?;
            let page: ListStoresResponse = read_json(
                "PROVISION_FAILED",
                "Failed to list file search stores",
                resp,
            )?;
            out.extend(page.file_search_stores);

            match page.next_page_token.filter(|t| !t.is_empty()) {
                Some(token) => page_token = Some(token),
                None => return Ok(out),
            }
        }

        tracing::warn!(pages = LIST_MAX_PAGES, "store listing truncated");
        Ok(out)
    }

    fn delete_store(&self, store: &StoreId, force: bool) -> Result<(), AppError> {
        let url = self.client.api_url(store.as_str());
        self.client
            .request("DELETE", &url, self.request_timeout)
            .query("force", if force { "true" } else { "false" })
            .call()
            .map_err(|e| call_error("PROVISION_FAILED", "Failed to delete file search store", e))
            .map(|_| ())
    }

    fn upload_document(
        &self,
        store: &StoreId,
        path: &Path,
        display_name: &str,
    ) -> Result<Operation, AppError> {
        let bytes = fs::read(path).map_err(|e| {
            AppError::new("PROVISION_FAILED", "Failed to read document for upload")
                .with_details(format!("path={}; err={}", path.display(), e))
        })?;
        let mime = mime_guess::from_path(path).first_or_octet_stream();
        let mime = mime.essence_str();

        // Resumable protocol: a start request returns the session URL, then one finalize chunk.
        let start_url = self
            .client
            .upload_url(&format!("{}:uploadToFileSearchStore", store.as_str()));
        let start = self
            .client
            .request("POST", &start_url, self.request_timeout)
            .set("X-Goog-Upload-Protocol", "resumable")
            .set("X-Goog-Upload-Command", "start")
            .set("X-Goog-Upload-Header-Content-Length", &bytes.len().to_string())
            .set("X-Goog-Upload-Header-Content-Type", mime)
            .send_json(UploadMetadata {
                display_name,
                mime_type: mime,
            })
            .map_err(|e| call_error("PROVISION_FAILED", "Failed to start document upload", e))?;

        let session_url = start
            .header("x-goog-upload-url")
            .map(str::to_string)
            .ok_or_else(|| {
                AppError::new(
                    "PROVISION_FAILED",
                    "Upload start response did not include an upload URL",
                )
                .with_details(format!("status={}", start.status()))
            })?;

        let resp = self
            .client
            .request("POST", &session_url, self.upload_timeout)
            .set("X-Goog-Upload-Command", "upload, finalize")
            .set("X-Goog-Upload-Offset", "0")
            .send_bytes(&bytes)
            .map_err(|e| call_error("PROVISION_FAILED", "Failed to upload document bytes", e))?;

        read_json("PROVISION_FAILED", "Failed to upload document bytes", resp)
    }

    fn get_operation(&self, name: &str) -> Result<Operation, AppError> {
        let url = self.client.api_url(name);
        let resp = self
            .client
            .request("GET", &url, self.request_timeout)
            .call()
            .map_err(|e| call_error("PROVISION_FAILED", "Failed to poll indexing operation", e))?;
        read_json("PROVISION_FAILED", "Failed to poll indexing operation", resp)
    }
}
