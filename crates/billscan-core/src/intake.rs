//! Upload decoding: images are decoded directly, PDFs contribute their
//! rasterized first page.

use std::path::Path;

use image::DynamicImage;
use tracing::{debug, warn};

use crate::error::{IntakeError, Result};
use crate::pdf::{PageRenderer, PdfExtractor, PdfProcessor};

/// Kind of uploaded file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadKind {
    Png,
    Jpeg,
    Pdf,
}

impl UploadKind {
    /// Detect from a media type such as `application/pdf`.
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type.trim().to_ascii_lowercase().as_str() {
            "image/png" => Some(Self::Png),
            "image/jpeg" | "image/jpg" => Some(Self::Jpeg),
            "application/pdf" => Some(Self::Pdf),
            _ => None,
        }
    }

    /// Detect from a file name extension.
    pub fn from_file_name(name: &str) -> Option<Self> {
        let extension = Path::new(name)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("")
            .to_lowercase();

        match extension.as_str() {
            "png" => Some(Self::Png),
            "jpg" | "jpeg" => Some(Self::Jpeg),
            "pdf" => Some(Self::Pdf),
            _ => None,
        }
    }
}

/// One uploaded file.
#[derive(Debug, Clone)]
pub struct Upload {
    /// Original file name.
    pub name: String,
    /// Detected kind.
    pub kind: UploadKind,
    /// Raw bytes.
    pub data: Vec<u8>,
}

impl Upload {
    /// Create an upload, detecting the kind from the media type first and
    /// the file name second.
    pub fn new(name: impl Into<String>, media_type: Option<&str>, data: Vec<u8>) -> Result<Self> {
        let name = name.into();
        let kind = media_type
            .and_then(UploadKind::from_media_type)
            .or_else(|| UploadKind::from_file_name(&name))
            .ok_or_else(|| IntakeError::UnsupportedType(name.clone()))?;

        if data.is_empty() {
            return Err(IntakeError::Empty.into());
        }

        Ok(Self { name, kind, data })
    }

    /// Read an upload from disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
            .to_string();
        let data = std::fs::read(path)?;
        Self::new(name, None, data)
    }

    /// Decode into the image that represents the invoice. PDFs contribute
    /// page 1 as drawn by `renderer`.
    ///
    /// When rendering fails the largest image embedded in page 1 is used, so
    /// scanned PDFs still work without poppler installed.
    pub fn decode(&self, renderer: &PageRenderer) -> Result<DynamicImage> {
        match self.kind {
            UploadKind::Png => Ok(image::load_from_memory_with_format(
                &self.data,
                image::ImageFormat::Png,
            )?),
            UploadKind::Jpeg => Ok(image::load_from_memory_with_format(
                &self.data,
                image::ImageFormat::Jpeg,
            )?),
            UploadKind::Pdf => match renderer.render_page(&self.data, 1) {
                Ok(image) => {
                    debug!(
                        width = image.width(),
                        height = image.height(),
                        "Rendered first page of {}", self.name
                    );
                    Ok(image)
                }
                Err(e) => {
                    warn!(error = %e, "Rendering {} failed, using embedded images", self.name);
                    let mut extractor = PdfExtractor::new();
                    extractor.load(&self.data)?;
                    debug!(pages = extractor.page_count(), "Using first page of {}", self.name);
                    Ok(extractor.page_image(1)?)
                }
            },
        }
    }
}
