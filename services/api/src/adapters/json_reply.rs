//! services/api/src/adapters/json_reply.rs
//!
//! Pulls a JSON document out of an LLM reply. Models often wrap JSON in markdown
//! code fences or add a sentence around it; both are tolerated here.

use regex::Regex;
use serde::de::DeserializeOwned;
use tutor_core::ports::{PortError, PortResult};

const FENCE_PATTERN: &str = r"(?s)```(?:json|JSON)?\s*(.*?)\s*```";

/// Parses the JSON payload of a model reply into `T`.
pub fn parse_json_reply<T: DeserializeOwned>(raw: &str) -> PortResult<T> {
    let payload = extract_payload(raw)?;
    serde_json::from_str(payload)
        .map_err(|e| PortError::InvalidResponse(format!("reply is not the expected JSON: {}", e)))
}

fn extract_payload(raw: &str) -> PortResult<&str> {
    let fence = Regex::new(FENCE_PATTERN).map_err(|e| PortError::Unexpected(e.to_string()))?;
    if let Some(body) = fence.captures(raw).and_then(|c| c.get(1)) {
        return Ok(body.as_str());
    }

    // No fence: take the outermost object or array.
    let start = raw.find(['{', '[']);
    let end = raw.rfind(['}', ']']);
    match (start, end) {
        (Some(start), Some(end)) if end > start => Ok(&raw[start..=end]),
        _ => Err(PortError::InvalidResponse(
            "reply contains no JSON document".to_string(),
        )),
    }
}
