pub mod providers;

use anyhow::Result;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ChatMessage {
    pub role: String,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: content.into(),
        }
    }
}

/// One call to the text endpoint.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub reasoning_effort: Option<String>,
}

#[async_trait]
pub trait LlmProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Send the request and return the decoded response body as-is. Error
    /// envelopes are left in the body for the caller to surface.
    async fn respond(&self, request: &TextRequest) -> Result<Value>;
}

/// Message of an explicit error envelope (`{"error": {...}}`), if present.
pub fn error_message(response: &Value) -> Option<String> {
    let err = response.get("error")?;
    match err {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => Some(
            map.get("message")
                .and_then(Value::as_str)
                .map(String::from)
                .unwrap_or_else(|| err.to_string()),
        ),
        other => Some(other.to_string()),
    }
}

/// Concatenate the text segments of a response body.
///
/// Walks `output[].content[]` items of type `output_text` (or any item with a
/// string `text`), then falls back to a top-level `output_text` string and
/// chat-completions style `choices[].message.content`.
pub fn extract_text(response: &Value) -> String {
    let mut out = String::new();

    if let Some(items) = response.get("output").and_then(Value::as_array) {
        for item in items {
            let Some(parts) = item.get("content").and_then(Value::as_array) else {
                continue;
            };
            for part in parts {
                let kind = part.get("type").and_then(Value::as_str).unwrap_or("");
                if kind == "reasoning" || kind == "refusal" {
                    continue;
                }
                if let Some(text) = part.get("text").and_then(Value::as_str) {
                    out.push_str(text);
                }
            }
        }
    }

    if out.is_empty()
        && let Some(text) = response.get("output_text").and_then(Value::as_str)
    {
        out.push_str(text);
    }

    if out.is_empty()
        && let Some(choices) = response.get("choices").and_then(Value::as_array)
    {
        for choice in choices {
            if let Some(text) = choice
                .get("message")
                .and_then(|m| m.get("content"))
                .and_then(Value::as_str)
            {
                out.push_str(text);
            }
        }
    }

    out
}
