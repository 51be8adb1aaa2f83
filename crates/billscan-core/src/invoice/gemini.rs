//! Gemini `generateContent` client.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ServiceError};
use crate::models::config::{credential_from_env, LlmConfig};
use crate::models::record::RecordFields;
use crate::service::{ensure_success, http_client};

use super::parser::parse_entities;
use super::prompt::PromptBuilder;
use super::{EntityExtractor, InsightGenerator};

const SERVICE: &str = "gemini";

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    contents: Vec<Content<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    parts: Vec<RequestPart<'a>>,
}

#[derive(Debug, Serialize)]
struct RequestPart<'a> {
    text: &'a str,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize)]
struct Candidate {
    content: Option<CandidateContent>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: String,
}

/// Client for the Gemini generative-text API.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    endpoint: String,
    model: String,
    api_key: String,
    prompt: PromptBuilder,
    max_text_chars: usize,
}

impl GeminiClient {
    /// Create a client, reading the API key from the configured variable.
    pub fn from_config(config: &LlmConfig) -> Result<Self> {
        let api_key = credential_from_env(&config.api_key_env)?;
        let prompt = PromptBuilder::new()
            .with_fields(config.fields.iter().cloned())
            .with_date_format(config.date_format.clone());

        info!(model = %config.model, "Using Gemini extraction backend");

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key,
            prompt,
            max_text_chars: config.max_text_chars,
        })
    }

    /// Send one prompt and return the concatenated response text.
    pub async fn generate(&self, prompt: &str) -> Result<String> {
        let url = format!("{}/models/{}:generateContent", self.endpoint, self.model);
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: prompt }],
            }],
        };

        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::Http)?;
        let response = ensure_success(SERVICE, response).await?;

        let body: GenerateResponse = response.json().await.map_err(ServiceError::Http)?;
        let text = response_text(body).ok_or_else(|| ServiceError::InvalidResponse {
            service: SERVICE,
            reason: "no candidate text".to_string(),
        })?;

        debug!(response_len = text.len(), "Gemini response received");
        Ok(text)
    }
}

fn response_text(body: GenerateResponse) -> Option<String> {
    let content = body.candidates.into_iter().next()?.content?;
    let text: String = content.parts.into_iter().map(|p| p.text).collect();
    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

/// Cut `text` to at most `max_chars` characters on a char boundary.
fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

impl EntityExtractor for GeminiClient {
    async fn extract_entities(&self, text: &str) -> Result<RecordFields> {
        let prompt = self.prompt.build(truncate_chars(text, self.max_text_chars));
        let response = self.generate(&prompt).await?;
        Ok(parse_entities(&response, text))
    }
}

impl InsightGenerator for GeminiClient {
    async fn generate_insights(&self, prompt: &str) -> Result<String> {
        let text = self.generate(prompt).await?;
        Ok(text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_text_joins_parts() {
        let body: GenerateResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "{\"a\":"}, {"text": "1}"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(response_text(body).as_deref(), Some("{\"a\":1}"));
    }

    #[test]
    fn test_response_text_empty() {
        let body: GenerateResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(response_text(body), None);

        let body: GenerateResponse =
            serde_json::from_str(r#"{"candidates": [{"finishReason": "SAFETY"}]}"#).unwrap();
        assert_eq!(response_text(body), None);
    }

    #[test]
    fn test_request_shape() {
        let request = GenerateRequest {
            contents: vec![Content {
                parts: vec![RequestPart { text: "hi" }],
            }],
        };
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(value["contents"][0]["parts"][0]["text"], "hi");
    }

    #[test]
    fn test_truncate_chars() {
        assert_eq!(truncate_chars("₹100 total", 4), "₹100");
        assert_eq!(truncate_chars("short", 100), "short");
    }
}
