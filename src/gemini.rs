use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use reqwest::Client;
use tracing::{info, error, debug};

use crate::config::Config;

#[derive(Debug, Error)]
pub enum GeminiError {
    #[error("HTTP error: {0}")] Http(String),
    #[error("status={status} body={body}")] Status { status: u16, body: String },
    #[error("decode error: {0}")] Decode(String),
    #[error("timed out after {0:?}")] Timeout(Duration),
}

/// The two model capabilities an offer round needs.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Runs a JSON-constrained text generation and returns the raw response text.
    async fn generate_text(&self, prompt: &str, schema: &Value) -> Result<String, GeminiError>;

    /// Runs an image generation and returns the content parts of the first candidate.
    async fn generate_image(&self, prompt: &str) -> Result<Vec<Part>, GeminiError>;
}

// Shorten inline base64 so logged responses stay readable
fn truncate_base64_in_json(value: &mut Value) {
    match value {
        Value::Object(map) => {
            for (key, val) in map.iter_mut() {
                if key == "data" {
                    if let Value::String(s) = val {
                        if s.len() > 100 && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '+' || c == '/' || c == '=') {
                            *val = Value::String(format!("{}...[truncated {} chars]", &s[..50], s.len() - 50));
                        }
                    }
                } else {
                    truncate_base64_in_json(val);
                }
            }
        }
        Value::Array(arr) => {
            for val in arr.iter_mut() {
                truncate_base64_in_json(val);
            }
        }
        _ => {}
    }
}

fn loggable_body(response_text: &str) -> String {
    match serde_json::from_str::<Value>(response_text) {
        Ok(mut json_value) => {
            truncate_base64_in_json(&mut json_value);
            json_value.to_string()
        }
        Err(_) => response_text.chars().take(1000).collect(),
    }
}

pub struct GeminiClient {
    client: Client,
    api_key: String,
    base_url: String,
    text_model: String,
    image_model: String,
}

impl GeminiClient {
    pub fn new(config: &Config) -> Result<Self, GeminiError> {
        let client = Client::builder()
            .timeout(config.call_timeout)
            .build()
            .map_err(|e| GeminiError::Http(e.to_string()))?;
        Ok(Self {
            client,
            api_key: config.api_key.clone(),
            base_url: config.api_base.clone(),
            text_model: config.text_model.clone(),
            image_model: config.image_model.clone(),
        })
    }

    fn endpoint(&self, model: &str, key: &str) -> String {
        format!("{}/models/{}:generateContent?key={}", self.base_url, model, key)
    }

    async fn perform_api_call(&self, model: &str, request_body: &Value) -> Result<GeminiResponse, GeminiError> {
        let url = self.endpoint(model, &self.api_key);

        info!("🔗 Making request to: {}", self.endpoint(model, "***"));
        debug!("📤 Request body: {}", request_body);

        let response = self.client
            .post(&url)
            .json(request_body)
            .send()
            .await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        let status = response.status();
        info!("📥 Response status: {}", status);

        let response_text = response.text().await
            .map_err(|e| GeminiError::Http(e.to_string()))?;

        if !status.is_success() {
            error!("❌ API Error response: {}", response_text);
            return Err(GeminiError::Status { status: status.as_u16(), body: response_text });
        }

        debug!("📥 Raw Gemini API response: {}", loggable_body(&response_text));

        serde_json::from_str(&response_text)
            .map_err(|e| GeminiError::Decode(e.to_string()))
    }
}

#[async_trait]
impl GenerativeBackend for GeminiClient {
    async fn generate_text(&self, prompt: &str, schema: &Value) -> Result<String, GeminiError> {
        info!("Generating offer text with {}...", self.text_model);

        let payload = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseMimeType": "application/json",
                "responseSchema": schema
            }
        });

        let parsed = self.perform_api_call(&self.text_model, &payload).await?;
        let text: String = parsed
            .candidates
            .into_iter()
            .next()
            .map(|c| {
                c.content.parts.into_iter().filter_map(|p| match p {
                    Part::Text { text } => Some(text),
                    _ => None,
                }).collect()
            })
            .unwrap_or_default();

        Ok(text.trim().to_string())
    }

    async fn generate_image(&self, prompt: &str) -> Result<Vec<Part>, GeminiError> {
        info!("Generating image with {}...", self.image_model);

        let payload = json!({
            "contents": [{
                "parts": [{"text": prompt}]
            }],
            "generationConfig": {
                "responseModalities": ["IMAGE"]
            }
        });

        let parsed = self.perform_api_call(&self.image_model, &payload).await?;
        Ok(parsed.candidates.into_iter().next().map(|c| c.content.parts).unwrap_or_default())
    }
}

// --- Response Parsing Helpers ---

#[derive(Debug, Deserialize)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate { #[serde(default)] content: Content }

#[derive(Debug, Deserialize, Default)]
struct Content { #[serde(default)] parts: Vec<Part> }

#[derive(Debug, Deserialize, Clone, PartialEq)]
#[serde(untagged)]
pub enum Part {
    Inline {
        #[serde(rename = "inlineData")]
        inline_data: InlineData
    },
    Text { text: String },
    Other(Value)
}

#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct InlineData {
    pub data: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
}
