use anyhow::Result;
use reqwest::{Client, StatusCode, header};
use serde_json::{Value, json};
use std::time::{Duration, Instant};
use tracing::{debug, info};
use url::Url;

use crate::core::errors::PipelineError;

pub const DEFAULT_BASE_URL: &str = "https://api.replicate.com/v1";
pub const MAX_REDIRECTS: usize = 3;

#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub model: String,
    pub aspect_ratio: String,
    pub output_format: String,
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Client for a prediction-style image service ("create and wait", then
/// optional polling of the returned status URL).
pub struct ImageRenderer {
    api_token: String,
    base_url: String,
    settings: RenderSettings,
    api: Client,
    downloads: Client,
}

impl ImageRenderer {
    pub fn new(api_token: String, base_url: Option<String>, settings: RenderSettings) -> Result<Self> {
        let downloads = Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .build()?;
        Ok(Self {
            api_token,
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            settings,
            api: Client::new(),
            downloads,
        })
    }

    /// Render `prompt` and return the image bytes.
    pub async fn render(&self, prompt: &str) -> Result<Vec<u8>> {
        let prediction = self.create_prediction(prompt).await?;
        let prediction = self.wait_for_terminal(prediction).await?;
        let url = resolve_output_url(prediction.get("output").unwrap_or(&Value::Null))
            .ok_or_else(|| PipelineError::Render(format!("no output URL in response: {}", prediction)))?;
        debug!("Downloading rendered image from {}", url);
        download(&self.downloads, &url, MAX_REDIRECTS).await
    }

    async fn create_prediction(&self, prompt: &str) -> Result<Value> {
        let body = json!({
            "input": {
                "prompt": prompt,
                "aspect_ratio": self.settings.aspect_ratio,
                "output_format": self.settings.output_format,
            }
        });
        let url = format!("{}/models/{}/predictions", self.base_url, self.settings.model);
        let res = self
            .api
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_token))
            .header("Prefer", "wait")
            .json(&body)
            .send()
            .await
            .map_err(|e| PipelineError::Render(format!("request to {} failed: {}", url, e)))?;
        prediction_body(res).await
    }

    async fn wait_for_terminal(&self, mut prediction: Value) -> Result<Value> {
        let started = Instant::now();
        loop {
            let status = prediction
                .get("status")
                .and_then(Value::as_str)
                .unwrap_or("succeeded")
                .to_string();
            match status.as_str() {
                "failed" | "canceled" | "cancelled" => {
                    let reason = service_error(&prediction).unwrap_or_else(|| "no reason given".into());
                    return Err(PipelineError::Render(format!("prediction {}: {}", status, reason)).into());
                }
                "starting" | "processing" => {}
                _ => return Ok(prediction),
            }

            let Some(poll_url) = prediction
                .get("urls")
                .and_then(|u| u.get("get"))
                .and_then(Value::as_str)
                .map(String::from)
            else {
                return Ok(prediction);
            };
            if started.elapsed() >= self.settings.timeout {
                return Err(PipelineError::Render(format!(
                    "prediction still {} after {:?}",
                    status, self.settings.timeout
                ))
                .into());
            }
            info!("Prediction {}; polling {}", status, poll_url);
            tokio::time::sleep(self.settings.poll_interval).await;
            let res = self
                .api
                .get(&poll_url)
                .header("Authorization", format!("Bearer {}", self.api_token))
                .send()
                .await
                .map_err(|e| PipelineError::Render(format!("poll of {} failed: {}", poll_url, e)))?;
            prediction = prediction_body(res).await?;
        }
    }
}

/// Decode a prediction response. Non-success statuses and non-JSON bodies
/// are render failures.
async fn prediction_body(res: reqwest::Response) -> Result<Value> {
    let status = res.status();
    let text = res
        .text()
        .await
        .map_err(|e| PipelineError::Render(format!("reading prediction body: {}", e)))?;
    match serde_json::from_str::<Value>(&text) {
        Ok(value) if status.is_success() => Ok(value),
        Ok(value) => Err(PipelineError::Render(format!(
            "service returned {}: {}",
            status,
            service_error(&value).unwrap_or(text)
        ))
        .into()),
        Err(_) => Err(PipelineError::Render(format!(
            "service returned {} with a non-JSON body: {}",
            status,
            crate::core::errors::excerpt(&text)
        ))
        .into()),
    }
}

fn service_error(value: &Value) -> Option<String> {
    match value.get("error").or_else(|| value.get("detail"))? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn is_url(s: &str) -> bool {
    s.starts_with("http://") || s.starts_with("https://")
}

/// Find the image URL in a prediction's `output` field: a string, the first
/// string of an array, or the first URL-looking string among a mapping's
/// values (scalars or arrays).
pub fn resolve_output_url(output: &Value) -> Option<String> {
    match output {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(Value::as_str).map(String::from),
        Value::Object(map) => map.values().find_map(|v| match v {
            Value::String(s) if is_url(s) => Some(s.clone()),
            Value::Array(items) => items
                .iter()
                .filter_map(Value::as_str)
                .find(|s| is_url(s))
                .map(String::from),
            _ => None,
        }),
        _ => None,
    }
}

/// GET `url`, following at most `max_redirects` redirects by hand.
pub async fn download(client: &Client, url: &str, max_redirects: usize) -> Result<Vec<u8>> {
    let mut current = Url::parse(url)
        .map_err(|e| PipelineError::Download(format!("invalid URL {}: {}", url, e)))?;
    let mut redirects = 0;
    loop {
        let res = client
            .get(current.clone())
            .send()
            .await
            .map_err(|e| PipelineError::Download(format!("request to {} failed: {}", current, e)))?;
        let status = res.status();
        if status.is_success() {
            let bytes = res
                .bytes()
                .await
                .map_err(|e| PipelineError::Download(format!("reading body from {}: {}", current, e)))?;
            return Ok(bytes.to_vec());
        }
        if !status.is_redirection() || status == StatusCode::NOT_MODIFIED {
            return Err(PipelineError::Download(format!("{} returned {}", current, status)).into());
        }
        if redirects >= max_redirects {
            return Err(PipelineError::Download(format!(
                "more than {} redirects starting at {}",
                max_redirects, url
            ))
            .into());
        }
        let location = res
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| PipelineError::Download(format!("{} redirect without Location", status)))?;
        current = current
            .join(location)
            .map_err(|e| PipelineError::Download(format!("bad redirect target {}: {}", location, e)))?;
        redirects += 1;
    }
}
