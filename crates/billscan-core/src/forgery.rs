//! Optional image forgery detection.

use base64::prelude::*;
use image::DynamicImage;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, ServiceError};
use crate::models::config::{credential_from_env, ForgeryConfig};
use crate::service::{encode_png, ensure_success, http_client};

const SERVICE: &str = "replicate";

/// Mean heatmap intensity above which an upload counts as forged.
pub const DEFAULT_INTENSITY_THRESHOLD: f64 = 150.0;

/// How suspicious a forgery heatmap looks.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ForgeryVerdict {
    /// Mean grayscale intensity of the heatmap (0 - 255).
    pub intensity: f64,
    /// Threshold the intensity was compared against.
    pub threshold: f64,
    /// Whether the intensity is strictly above the threshold.
    pub forged: bool,
}

impl ForgeryVerdict {
    /// Score a heatmap against a threshold.
    pub fn from_heatmap(heatmap: &DynamicImage, threshold: f64) -> Self {
        let intensity = heatmap_intensity(heatmap);
        Self {
            intensity,
            threshold,
            forged: intensity > threshold,
        }
    }
}

/// Mean luma of a heatmap, with ITU-R 601-2 weights in 16-bit fixed point.
pub fn heatmap_intensity(heatmap: &DynamicImage) -> f64 {
    let rgb = heatmap.to_rgb8();
    let pixels = u64::from(rgb.width()) * u64::from(rgb.height());
    if pixels == 0 {
        return 0.0;
    }

    let sum: u64 = rgb
        .pixels()
        .map(|p| {
            let [r, g, b] = p.0.map(u64::from);
            (r * 19595 + g * 38470 + b * 7471 + 0x8000) >> 16
        })
        .sum();
    sum as f64 / pixels as f64
}

/// Checks an invoice image for manipulation.
#[allow(async_fn_in_trait)]
pub trait ForgeryDetector {
    /// Return a heatmap of suspicious regions, or `None` when the service
    /// reports nothing.
    async fn detect_forgery(&self, image: &DynamicImage) -> Result<Option<DynamicImage>>;
}

/// Detector used when forgery checks are disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoForgeryCheck;

impl ForgeryDetector for NoForgeryCheck {
    async fn detect_forgery(&self, _image: &DynamicImage) -> Result<Option<DynamicImage>> {
        Ok(None)
    }
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput,
}

#[derive(Debug, Serialize)]
struct PredictionInput {
    image: String,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    #[serde(default)]
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Value,
}

/// Replicate-hosted forgery detection model.
pub struct ReplicateClient {
    client: Client,
    endpoint: String,
    model_version: String,
    api_token: String,
}

impl ReplicateClient {
    /// Create a client, reading the API token from the configured variable.
    pub fn from_config(config: &ForgeryConfig) -> Result<Self> {
        let api_token = credential_from_env(&config.api_token_env)?;
        info!(endpoint = %config.endpoint, "Using Replicate forgery detection");

        Ok(Self {
            client: http_client(config.timeout_secs)?,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
            model_version: config.model_version.clone(),
            api_token,
        })
    }

    async fn fetch_image(&self, url: &str) -> Result<DynamicImage> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(ServiceError::Http)?;
        let response = ensure_success(SERVICE, response).await?;
        let bytes = response.bytes().await.map_err(ServiceError::Http)?;
        Ok(image::load_from_memory(&bytes)?)
    }
}

/// The heatmap URL of a finished prediction.
fn output_url(prediction: &Prediction) -> Result<Option<String>> {
    if prediction.status != "succeeded" {
        let reason = match &prediction.error {
            Value::Null => format!("prediction status '{}'", prediction.status),
            other => other.to_string(),
        };
        return Err(ServiceError::InvalidResponse {
            service: SERVICE,
            reason,
        }
        .into());
    }

    let url = match &prediction.output {
        Value::String(s) => Some(s.clone()),
        Value::Array(items) => items.iter().find_map(|v| v.as_str().map(str::to_string)),
        _ => None,
    };
    Ok(url.filter(|u| !u.is_empty()))
}

impl ForgeryDetector for ReplicateClient {
    async fn detect_forgery(&self, image: &DynamicImage) -> Result<Option<DynamicImage>> {
        let png = encode_png(image)?;
        let request = PredictionRequest {
            version: &self.model_version,
            input: PredictionInput {
                image: format!("data:image/png;base64,{}", BASE64_STANDARD.encode(&png)),
            },
        };

        let response = self
            .client
            .post(format!("{}/predictions", self.endpoint))
            .bearer_auth(&self.api_token)
            .header("Prefer", "wait")
            .json(&request)
            .send()
            .await
            .map_err(ServiceError::Http)?;
        let response = ensure_success(SERVICE, response).await?;
        let prediction: Prediction = response.json().await.map_err(ServiceError::Http)?;

        match output_url(&prediction)? {
            Some(url) => {
                debug!(%url, "Fetching forgery heatmap");
                Ok(Some(self.fetch_image(&url).await?))
            }
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prediction(json: &str) -> Prediction {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_output_url_string_and_array() {
        let p = prediction(r#"{"status": "succeeded", "output": "https://x/heat.png"}"#);
        assert_eq!(output_url(&p).unwrap().as_deref(), Some("https://x/heat.png"));

        let p = prediction(r#"{"status": "succeeded", "output": ["https://x/a.png"]}"#);
        assert_eq!(output_url(&p).unwrap().as_deref(), Some("https://x/a.png"));
    }

    #[test]
    fn test_output_url_none() {
        let p = prediction(r#"{"status": "succeeded", "output": null}"#);
        assert_eq!(output_url(&p).unwrap(), None);
    }

    #[test]
    fn test_output_url_failed_prediction() {
        let p = prediction(r#"{"status": "failed", "error": "CUDA out of memory"}"#);
        let err = output_url(&p).unwrap_err();
        assert!(err.to_string().contains("CUDA out of memory"));

        let p = prediction(r#"{"status": "processing"}"#);
        assert!(output_url(&p).unwrap_err().to_string().contains("processing"));
    }

    #[tokio::test]
    async fn test_no_forgery_check() {
        let image = DynamicImage::new_rgb8(1, 1);
        assert!(NoForgeryCheck.detect_forgery(&image).await.unwrap().is_none());
    }

    #[test]
    fn test_heatmap_intensity() {
        let rgb = |r, g, b| {
            DynamicImage::ImageRgb8(image::RgbImage::from_pixel(4, 4, image::Rgb([r, g, b])))
        };
        let white = rgb(255, 255, 255);
        let red = rgb(255, 0, 0);
        assert_eq!(heatmap_intensity(&white), 255.0);
        assert_eq!(heatmap_intensity(&red), 76.0);
        assert_eq!(heatmap_intensity(&DynamicImage::new_rgb8(0, 0)), 0.0);
    }

    #[test]
    fn test_verdict_threshold_is_exclusive() {
        let gray = |level| {
            DynamicImage::ImageLuma8(image::GrayImage::from_pixel(8, 8, image::Luma([level])))
        };
        let bright = gray(200);
        let dark = gray(40);
        let edge = gray(150);

        assert!(ForgeryVerdict::from_heatmap(&bright, DEFAULT_INTENSITY_THRESHOLD).forged);
        assert!(!ForgeryVerdict::from_heatmap(&dark, DEFAULT_INTENSITY_THRESHOLD).forged);
        assert!(!ForgeryVerdict::from_heatmap(&edge, DEFAULT_INTENSITY_THRESHOLD).forged);
        assert!(ForgeryVerdict::from_heatmap(&edge, 149.5).forged);
    }
}
