//! Structured field extraction through a generative-text service.

mod gemini;
mod parser;
mod prompt;
pub mod rules;

pub use gemini::GeminiClient;
pub use parser::parse_entities;
pub use prompt::{insights_prompt, PromptBuilder, DEFAULT_FIELDS};

use crate::error::Result;
use crate::models::record::RecordFields;

/// Turns raw invoice text into record fields.
///
/// Implementations parse the service response with [`parse_entities`], so a
/// malformed response yields the degraded record. An `Err` means the service
/// itself could not be reached.
#[allow(async_fn_in_trait)]
pub trait EntityExtractor {
    /// Extract structured fields from raw OCR text.
    async fn extract_entities(&self, text: &str) -> Result<RecordFields>;
}

/// Produces free-text spending insights from a prepared prompt.
#[allow(async_fn_in_trait)]
pub trait InsightGenerator {
    /// Generate bullet-point insights.
    async fn generate_insights(&self, prompt: &str) -> Result<String>;
}
