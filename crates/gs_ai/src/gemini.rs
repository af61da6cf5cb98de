use std::time::Duration;

use gs_core::error::AppError;
use serde::de::DeserializeOwned;

const API_KEY_HEADER: &str = "x-goog-api-key";

/// Connection details for the hosted Gemini API. Cheap to clone; the agent pools connections.
#[derive(Debug, Clone)]
pub struct GeminiClient {
    base_url: String,
    api_key: String,
    agent: ureq::Agent,
}

impl GeminiClient {
    /// `base_url` must be `https://...`; plain `http` is only accepted for `127.0.0.1`.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, AppError> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        validate_base_url(&base_url)?;

        let api_key = api_key.trim();
        if api_key.is_empty() {
            return Err(AppError::new(
                "CONFIG_API_KEY_MISSING",
                "API key is not configured",
            ));
        }

        Ok(Self {
            base_url,
            api_key: api_key.to_string(),
            agent: ureq::AgentBuilder::new().build(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// `/v1beta/<path>` under the API root.
    pub(crate) fn api_url(&self, path: &str) -> String {
        format!("{}/v1beta/{}", self.base_url, path.trim_start_matches('/'))
    }

    /// `/upload/v1beta/<path>`, used for media uploads.
    pub(crate) fn upload_url(&self, path: &str) -> String {
        format!(
            "{}/upload/v1beta/{}",
            self.base_url,
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn request(&self, method: &str, url: &str, timeout: Duration) -> ureq::Request {
        self.agent
            .request(method, url)
            .set(API_KEY_HEADER, &self.api_key)
            .timeout(timeout)
    }
}

fn validate_base_url(base_url: &str) -> Result<(), AppError> {
    let invalid = || {
        AppError::new(
            "REMOTE_BASE_URL_INVALID",
            "API base URL must use https (plain http is only allowed for 127.0.0.1)",
        )
        .with_details(format!("base_url={base_url}"))
    };

    if let Some(host) = base_url.strip_prefix("https://") {
        if host.is_empty() || host.contains('/') || host.contains('@') {
            return Err(invalid());
        }
        return Ok(());
    }

    // Local fakes and proxies only.
    let rest = base_url.strip_prefix("http://127.0.0.1").ok_or_else(invalid)?;
    if rest.is_empty() {
        return Ok(());
    }
    let port = rest.strip_prefix(':').ok_or_else(invalid)?;
    match port.parse::<u16>() {
        Ok(p) if p > 0 => Ok(()),
        _ => Err(invalid()),
    }
}

/// Maps a ureq failure into the caller's error code, keeping the HTTP status and body.
pub(crate) fn call_error(code: &str, message: &str, err: ureq::Error) -> AppError {
    match err {
        ureq::Error::Status(status, resp) => {
            let body = resp.into_string().unwrap_or_default();
            let retryable = status == 429 || status >= 500;
            AppError::new(code, message)
                .with_details(format!("status={status}; body={}", truncate(&body, 2_000)))
                .with_retryable(retryable)
        }
        ureq::Error::Transport(t) => AppError::new(code, message)
            .with_details(t.to_string())
            .with_retryable(true),
    }
}

pub(crate) fn read_json<T: DeserializeOwned>(
    code: &str,
    message: &str,
    resp: ureq::Response,
) -> Result<T, AppError> {
    resp.into_json::<T>().map_err(|e| {
        AppError::new(code, message).with_details(format!("failed to decode response: {e}"))
    })
}

fn truncate(s: &str, max: usize) -> &str {
    if s.len() <= max {
        return s;
    }
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}
