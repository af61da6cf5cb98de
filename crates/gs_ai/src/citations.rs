use gs_core::domain::Citation;
use serde_json::{json, Value};

use crate::generate::GenerateContentResponse;

pub const UNKNOWN_SOURCE: &str = "Unknown Source";

/// Maps the first candidate's grounding chunks to citations, one per chunk, in API order.
pub fn citations_from_response(resp: &GenerateContentResponse) -> Vec<Citation> {
    let Some(meta) = resp
        .first_candidate()
        .and_then(|c| c.grounding_metadata.as_ref())
    else {
        return Vec::new();
    };

    meta.grounding_chunks
        .iter()
        .map(|chunk| {
            let ctx = chunk.retrieved_context.clone().unwrap_or_default();
            Citation {
                title: ctx
                    .title
                    .filter(|t| !t.trim().is_empty())
                    .unwrap_or_else(|| UNKNOWN_SOURCE.to_string()),
                text: ctx.text.unwrap_or_default(),
                uri: ctx.uri.filter(|u| !u.is_empty()),
            }
        })
        .collect()
}

/// The grounding portion of a raw response, for debug display.
pub fn raw_grounding(raw: &Value) -> Value {
    let meta = &raw["candidates"][0]["groundingMetadata"];
    json!({
        "grounding_chunks": meta.get("groundingChunks").cloned().unwrap_or_else(|| json!([])),
        "grounding_supports": meta.get("groundingSupports").cloned().unwrap_or_else(|| json!([])),
    })
}
