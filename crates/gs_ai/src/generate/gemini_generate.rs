use std::time::Duration;

use gs_core::error::AppError;
use serde_json::Value;

use super::{GenerateContentRequest, Generation, Generator};
use crate::gemini::{call_error, read_json, GeminiClient};

#[derive(Debug, Clone)]
pub struct GeminiGenerator {
    client: GeminiClient,
    timeout: Duration,
}

impl GeminiGenerator {
    pub fn new(client: GeminiClient, timeout: Duration) -> Self {
        Self { client, timeout }
    }
}

fn model_path(model: &str) -> String {
    if model.starts_with("models/") {
        format!("{model}:generateContent")
    } else {
        format!("models/{model}:generateContent")
    }
}

impl Generator for GeminiGenerator {
    fn generate(
        &self,
        model: &str,
        request: &GenerateContentRequest,
    ) -> Result<Generation, AppError> {
        let url = self.client.api_url(&model_path(model));
        tracing::debug!(
            model,
            turns = request.contents.len(),
            "sending generateContent request"
        );

        let resp = self
            .client
            .request("POST", &url, self.timeout)
            .send_json(request)
            .map_err(|e| call_error("QUERY_FAILED", "Generation request failed", e))?;
        let raw: Value = read_json("QUERY_FAILED", "Generation request failed", resp)?;
        Generation::from_raw(raw)
    }
}
