use anyhow::{Result, anyhow};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::core::llm::{ChatMessage, LlmProvider, TextRequest};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

#[derive(Serialize)]
struct ResponsesRequest<'a> {
    model: &'a str,
    input: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    reasoning: Option<Reasoning<'a>>,
}

#[derive(Serialize)]
struct Reasoning<'a> {
    effort: &'a str,
}

pub struct OpenAiProvider {
    api_key: String,
    base_url: String,
    client: Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, base_url: Option<String>) -> Self {
        Self {
            api_key,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            client: Client::new(),
        }
    }
}

#[async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &str {
        "OpenAI"
    }

    async fn respond(&self, request: &TextRequest) -> Result<Value> {
        let req = ResponsesRequest {
            model: &request.model,
            input: &request.messages,
            reasoning: request
                .reasoning_effort
                .as_deref()
                .filter(|e| !e.is_empty())
                .map(|effort| Reasoning { effort }),
        };

        let res = self
            .client
            .post(format!("{}/responses", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&req)
            .send()
            .await?;
        let status = res.status();
        let body = res.text().await.unwrap_or_default();
        debug!("{} responded with {} ({} bytes)", self.name(), status, body.len());

        match serde_json::from_str::<Value>(&body) {
            Ok(value) => Ok(value),
            Err(_) if !status.is_success() => {
                Err(anyhow!("{} API Error ({}): {}", self.name(), status, body))
            }
            Err(e) => Err(anyhow!(
                "{} returned a non-JSON body ({}): {}",
                self.name(),
                e,
                crate::core::errors::excerpt(&body)
            )),
        }
    }
}
