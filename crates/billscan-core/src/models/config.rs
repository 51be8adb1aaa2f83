//! Configuration structures for the capture pipeline.
//!
//! Credentials never live in the config file. Each service section names the
//! environment variable its key is read from.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::error::{BillscanError, Result};

/// Main configuration for billscan.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct BillscanConfig {
    /// OCR service configuration.
    pub ocr: OcrConfig,

    /// Generative extraction service configuration.
    pub llm: LlmConfig,

    /// Optional forgery detection.
    pub forgery: ForgeryConfig,

    /// PDF page rendering.
    pub pdf: PdfConfig,

    /// Duplicate detection.
    pub duplicates: DuplicateConfig,

    /// Report output.
    pub report: ReportConfig,
}

/// Google Cloud Vision configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Base URL of the Vision REST API.
    pub endpoint: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Maximum image dimension (longer side) sent to the service.
    pub max_image_size: u32,

    /// Optional language hints, e.g. `["en", "hi"]`.
    pub language_hints: Vec<String>,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://vision.googleapis.com/v1".to_string(),
            api_key_env: "GOOGLE_VISION_API_KEY".to_string(),
            timeout_secs: 60,
            max_image_size: 2048,
            language_hints: Vec::new(),
        }
    }
}

/// Gemini configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    /// Base URL of the Generative Language REST API.
    pub endpoint: String,

    /// Model name.
    pub model: String,

    /// Environment variable holding the API key.
    pub api_key_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Fields requested from the model, in prompt order.
    pub fields: Vec<String>,

    /// Date format the model is asked to normalize to.
    pub date_format: String,

    /// Texts longer than this are truncated before prompting.
    pub max_text_chars: usize,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            model: "gemini-1.5-flash".to_string(),
            api_key_env: "GEMINI_API_KEY".to_string(),
            timeout_secs: 60,
            fields: crate::invoice::DEFAULT_FIELDS
                .iter()
                .map(|f| f.to_string())
                .collect(),
            date_format: "DD/MM/YYYY".to_string(),
            max_text_chars: 12_000,
        }
    }
}

/// Replicate forgery detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeryConfig {
    /// Run forgery detection on every upload.
    pub enabled: bool,

    /// Base URL of the Replicate API.
    pub endpoint: String,

    /// Model version hash.
    pub model_version: String,

    /// Environment variable holding the API token.
    pub api_token_env: String,

    /// Request timeout in seconds.
    pub timeout_secs: u64,

    /// Mean heatmap intensity (0 - 255) above which an upload is held as
    /// a suspected forgery.
    pub intensity_threshold: f64,
}

impl Default for ForgeryConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: "https://api.replicate.com/v1".to_string(),
            model_version: "ab6f81afdf0de95354d44b61c18f4dfe31dc0ad83da8b0406d57afff8f6ace08"
                .to_string(),
            api_token_env: "REPLICATE_API_TOKEN".to_string(),
            timeout_secs: 120,
            intensity_threshold: crate::forgery::DEFAULT_INTENSITY_THRESHOLD,
        }
    }
}

/// PDF rendering configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// `pdftoppm` executable, looked up on `PATH` unless absolute.
    pub renderer: String,

    /// Rendering resolution in dots per inch.
    pub dpi: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            renderer: crate::pdf::DEFAULT_RENDERER.to_string(),
            dpi: crate::pdf::DEFAULT_DPI,
        }
    }
}

/// Duplicate detection configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DuplicateConfig {
    /// Similarity score (0 - 100) at or above which an upload is a duplicate.
    pub threshold: u8,
}

impl Default for DuplicateConfig {
    fn default() -> Self {
        Self {
            threshold: crate::duplicate::DEFAULT_THRESHOLD,
        }
    }
}

/// Report configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    /// Directory the summary PDF is written to.
    pub output_dir: PathBuf,

    /// Width of source images on their report pages, in millimetres.
    pub image_width_mm: f32,

    /// Categories below this quantile of category totals are bucketed as "Other".
    pub other_quantile: f64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("."),
            image_width_mm: 180.0,
            other_quantile: 0.05,
        }
    }
}

impl BillscanConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> std::result::Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> std::result::Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}

/// Read a credential from the named environment variable.
pub fn credential_from_env(var: &str) -> Result<String> {
    match std::env::var(var) {
        Ok(value) if !value.trim().is_empty() => Ok(value),
        _ => Err(BillscanError::Config(format!(
            "environment variable {} is not set",
            var
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_config_uses_defaults() {
        let config: BillscanConfig =
            serde_json::from_str(r#"{"duplicates": {"threshold": 80}}"#).unwrap();
        assert_eq!(config.duplicates.threshold, 80);
        assert_eq!(config.llm.model, "gemini-1.5-flash");
        assert_eq!(config.llm.fields.len(), 6);
        assert!(!config.forgery.enabled);
        assert_eq!(config.forgery.intensity_threshold, 150.0);
        assert_eq!(config.pdf.renderer, "pdftoppm");
        assert_eq!(config.pdf.dpi, 200);
    }

    #[test]
    fn test_config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut config = BillscanConfig::default();
        config.report.image_width_mm = 150.0;
        config.save(&path).unwrap();

        let loaded = BillscanConfig::from_file(&path).unwrap();
        assert_eq!(loaded.report.image_width_mm, 150.0);
    }

    #[test]
    fn test_missing_credential() {
        let err = credential_from_env("BILLSCAN_TEST_SURELY_UNSET_VAR").unwrap_err();
        assert!(err.to_string().contains("BILLSCAN_TEST_SURELY_UNSET_VAR"));
    }
}
