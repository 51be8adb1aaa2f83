//! PDF intake: rasterizing a page, with embedded-image extraction as the
//! fallback when no renderer is available.

mod extractor;
mod render;

pub use extractor::PdfExtractor;
pub use render::{PageRenderer, DEFAULT_DPI, DEFAULT_RENDERER};

use crate::error::PdfError;
use image::DynamicImage;

/// Result type for PDF operations.
pub type Result<T> = std::result::Result<T, PdfError>;

/// Trait for PDF processing implementations.
pub trait PdfProcessor {
    /// Load a PDF from bytes.
    fn load(&mut self, data: &[u8]) -> Result<()>;

    /// Get the number of pages in the PDF.
    fn page_count(&self) -> u32;

    /// Extract embedded images from a page (1-indexed).
    fn extract_images(&self, page: u32) -> Result<Vec<DynamicImage>>;

    /// The image representing a page: its largest embedded raster image.
    fn page_image(&self, page: u32) -> Result<DynamicImage> {
        self.extract_images(page)?
            .into_iter()
            .max_by_key(|img| u64::from(img.width()) * u64::from(img.height()))
            .ok_or(PdfError::NoImage(page))
    }
}
