//! Google Cloud Vision `images:annotate` client.

use base64::prelude::*;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{Result, ServiceError};
use crate::models::config::{credential_from_env, OcrConfig};
use crate::service::{encode_png, ensure_success, http_client};

use super::{fit_image, TextExtractor};

const SERVICE: &str = "vision";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotateRequest {
    requests: Vec<ImageRequest>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageRequest {
    image: ImageContent,
    features: Vec<Feature>,
    #[serde(skip_serializing_if = "Option::is_none")]
    image_context: Option<ImageContext>,
}

#[derive(Debug, Serialize)]
struct ImageContent {
    content: String,
}

#[derive(Debug, Serialize)]
struct Feature {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageContext {
    language_hints: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct AnnotateResponse {
    #[serde(default)]
    responses: Vec<ImageResponse>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ImageResponse {
    #[serde(default)]
    text_annotations: Vec<TextAnnotation>,
    error: Option<StatusMessage>,
}

#[derive(Debug, Deserialize)]
struct TextAnnotation {
    #[serde(default)]
    description: String,
}

#[derive(Debug, Deserialize)]
struct StatusMessage {
    #[serde(default)]
    code: i32,
    #[serde(default)]
    message: String,
}

/// Client for Google Cloud Vision text detection.
pub struct VisionClient {
    client: Client,
    endpoint: String,
    api_key: String,
    max_image_size: u32,
    language_hints: Vec<String>,
}

impl VisionClient {
    /// Create a client, reading the API key from the configured variable.
    pub fn from_config(config: &OcrConfig) -> Result<Self> {
        let api_key = credential_from_env(&config.api_key_env)?;
        info!(endpoint = %config.endpoint, "Using Vision OCR backend");

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            api_key,
            max_image_size: config.max_image_size,
            language_hints: config.language_hints.clone(),
        })
    }

    fn build_request(&self, png: &[u8]) -> AnnotateRequest {
        let image_context = if self.language_hints.is_empty() {
            None
        } else {
            Some(ImageContext {
                language_hints: self.language_hints.clone(),
            })
        };

        AnnotateRequest {
            requests: vec![ImageRequest {
                image: ImageContent {
                    content: BASE64_STANDARD.encode(png),
                },
                features: vec![Feature {
                    kind: "TEXT_DETECTION",
                }],
                image_context,
            }],
        }
    }
}

/// The first annotation holds the full text; the rest are single words.
fn full_text(body: AnnotateResponse) -> Result<String> {
    let response = body.responses.into_iter().next().unwrap_or_default();

    if let Some(error) = response.error {
        return Err(ServiceError::InvalidResponse {
            service: SERVICE,
            reason: format!("code {}: {}", error.code, error.message),
        }
        .into());
    }

    Ok(response
        .text_annotations
        .into_iter()
        .next()
        .map(|a| a.description)
        .unwrap_or_default())
}

impl TextExtractor for VisionClient {
    async fn extract_text(&self, image: &DynamicImage) -> Result<String> {
        let resized = fit_image(image, self.max_image_size);
        let png = encode_png(resized.as_ref().unwrap_or(image))?;
        debug!(bytes = png.len(), "Sending image to Vision");

        let url = format!("{}/images:annotate", self.endpoint);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .json(&self.build_request(&png))
            .send()
            .await
            .map_err(ServiceError::Http)?;
        let response = ensure_success(SERVICE, response).await?;

        let body: AnnotateResponse = response.json().await.map_err(ServiceError::Http)?;
        let text = full_text(body)?;
        debug!(chars = text.len(), "Vision text detection complete");
        Ok(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_full_text_takes_first_annotation() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"textAnnotations": [
                {"description": "CAFE MOCHA\nTOTAL 250.00"},
                {"description": "CAFE"}
            ]}]}"#,
        )
        .unwrap();
        assert_eq!(full_text(body).unwrap(), "CAFE MOCHA\nTOTAL 250.00");
    }

    #[test]
    fn test_full_text_without_annotations_is_empty() {
        let body: AnnotateResponse = serde_json::from_str(r#"{"responses": [{}]}"#).unwrap();
        assert_eq!(full_text(body).unwrap(), "");

        let body: AnnotateResponse = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(full_text(body).unwrap(), "");
    }

    #[test]
    fn test_full_text_reports_service_error() {
        let body: AnnotateResponse = serde_json::from_str(
            r#"{"responses": [{"error": {"code": 3, "message": "Bad image data."}}]}"#,
        )
        .unwrap();
        let err = full_text(body).unwrap_err();
        assert!(err.to_string().contains("Bad image data."));
    }

    #[test]
    fn test_request_serialization() {
        let client = VisionClient {
            client: Client::new(),
            endpoint: "http://localhost".to_string(),
            api_key: "k".to_string(),
            max_image_size: 0,
            language_hints: vec!["en".to_string()],
        };
        let value = serde_json::to_value(client.build_request(b"abc")).unwrap();
        let request = &value["requests"][0];
        assert_eq!(request["image"]["content"], "YWJj");
        assert_eq!(request["features"][0]["type"], "TEXT_DETECTION");
        assert_eq!(request["imageContext"]["languageHints"][0], "en");
    }
}
