use serde_json::{Map, Value};

use super::openai_types::{
    ChatCompletionChunk, ChatCompletionResponse, ChatUsage, Choice, ChoiceMessage, ChunkChoice,
};
use crate::error::{ProxyError, Result};

const DATA_PREFIX: &str = "data: ";
const DONE_SENTINEL: &str = "[DONE]";
const SNIPPET_CHARS: usize = 200;

/// Translate one upstream reply payload into a chat completion.
/// Pure function: `model` is what the client asked for and is echoed back.
pub fn to_completion(payload: &Value, model: &str) -> ChatCompletionResponse {
    let first_choice = payload.pointer("/choices/0");

    let content = first_choice
        .and_then(|c| c.pointer("/message/content"))
        .and_then(Value::as_str)
        .or_else(|| payload.pointer("/message/content").and_then(Value::as_str))
        .unwrap_or_default();

    let finish_reason = first_choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .unwrap_or("stop");

    let usage = payload
        .get("usage")
        .filter(|u| !u.is_null())
        .cloned()
        .unwrap_or_else(zero_usage);

    ChatCompletionResponse {
        id: payload_id(payload),
        object: "chat.completion".to_string(),
        created: now(),
        model: model.to_string(),
        choices: vec![Choice {
            index: 0,
            message: ChoiceMessage {
                role: "assistant".to_string(),
                content: content.to_string(),
            },
            finish_reason: finish_reason.to_string(),
        }],
        usage,
    }
}

/// Translate one upstream streaming event into a completion chunk.
pub fn to_chunk(payload: &Value, model: &str) -> ChatCompletionChunk {
    let first_choice = payload.pointer("/choices/0");

    let mut delta: Map<String, Value> = first_choice
        .and_then(|c| c.get("delta"))
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let content = delta
        .get("content")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    delta.insert("content".to_string(), Value::String(content));

    let finish_reason = first_choice
        .and_then(|c| c.get("finish_reason"))
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(String::from);

    ChatCompletionChunk {
        id: payload_id(payload),
        object: "chat.completion.chunk".to_string(),
        created: now(),
        model: model.to_string(),
        choices: vec![ChunkChoice {
            index: 0,
            delta,
            finish_reason,
        }],
    }
}

/// Parse a non-streaming upstream body.
///
/// Some upstream deployments answer in event-stream framing even when no
/// stream was requested; in that case the last `data:` line that parses as
/// JSON is the payload.
pub fn parse_upstream_body(body: &str) -> Result<Value> {
    if body.starts_with(DATA_PREFIX) {
        if let Some(last) = last_event_payload(body) {
            return Ok(last);
        }
    }

    serde_json::from_str(body).map_err(|e| {
        tracing::warn!(error = %e, body_len = body.len(), "upstream body is not JSON");
        ProxyError::UpstreamFormat {
            snippet: body.chars().take(SNIPPET_CHARS).collect(),
        }
    })
}

fn last_event_payload(body: &str) -> Option<Value> {
    body.lines()
        .map(str::trim)
        .filter_map(|line| line.strip_prefix(DATA_PREFIX))
        .filter(|data| !data.contains(DONE_SENTINEL))
        .filter_map(|data| match serde_json::from_str::<Value>(data) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::debug!(error = %e, "skipping unparseable event line");
                None
            }
        })
        .last()
}

fn payload_id(payload: &Value) -> String {
    payload
        .get("id")
        .and_then(Value::as_str)
        .filter(|id| !id.is_empty())
        .map_or_else(generate_id, String::from)
}

/// A fresh `chatcmpl-` id. Cosmetic only; nothing relies on its uniqueness.
pub fn generate_id() -> String {
    format!("chatcmpl-{}", uuid::Uuid::new_v4().simple())
}

fn zero_usage() -> Value {
    serde_json::to_value(ChatUsage::default()).unwrap_or(Value::Null)
}

fn now() -> i64 {
    chrono::Utc::now().timestamp()
}
