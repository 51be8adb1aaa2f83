//! Error types for the billscan-core library.

use thiserror::Error;

/// Main error type for the billscan library.
#[derive(Error, Debug)]
pub enum BillscanError {
    /// Upload could not be turned into an image.
    #[error("intake error: {0}")]
    Intake(#[from] IntakeError),

    /// PDF processing error.
    #[error("PDF error: {0}")]
    Pdf(#[from] PdfError),

    /// External service (OCR, LLM, forgery detection) error.
    #[error("service error: {0}")]
    Service(#[from] ServiceError),

    /// Report generation error.
    #[error("report error: {0}")]
    Report(#[from] ReportError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Errors related to decoding uploads.
#[derive(Error, Debug)]
pub enum IntakeError {
    /// File type is not one of png, jpg, jpeg, pdf.
    #[error("unsupported upload type: {0}")]
    UnsupportedType(String),

    /// Upload has no content.
    #[error("upload is empty")]
    Empty,
}

/// Errors related to PDF processing.
#[derive(Error, Debug)]
pub enum PdfError {
    /// Failed to open/parse the PDF file.
    #[error("failed to parse PDF: {0}")]
    Parse(String),

    /// The PDF is encrypted and cannot be processed.
    #[error("PDF is encrypted")]
    Encrypted,

    /// The PDF is empty or has no pages.
    #[error("PDF has no pages")]
    NoPages,

    /// The first page carries no decodable raster image.
    #[error("no raster image on page {0}")]
    NoImage(u32),

    /// The page renderer could not be run or produced no image.
    #[error("failed to render page: {0}")]
    Render(String),
}

/// Errors from calls to external services.
#[derive(Error, Debug)]
pub enum ServiceError {
    /// Transport-level failure.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// Service answered with a non-success status.
    #[error("{service} returned {status}: {body}")]
    Status {
        service: &'static str,
        status: u16,
        body: String,
    },

    /// Service answered but the payload had nothing usable.
    #[error("{service} returned an unusable response: {reason}")]
    InvalidResponse {
        service: &'static str,
        reason: String,
    },
}

/// Errors related to report output.
#[derive(Error, Debug)]
pub enum ReportError {
    /// PDF object serialization failed.
    #[error("failed to encode PDF: {0}")]
    Encode(#[from] lopdf::Error),

    /// Document serialization failed.
    #[error("failed to serialize PDF: {0}")]
    Serialize(String),

    /// Embedding a source image failed.
    #[error("failed to embed image for invoice {id}: {reason}")]
    Image { id: u32, reason: String },

    /// Writing the output file failed.
    #[error("failed to write report: {0}")]
    Write(#[from] tempfile::PersistError),
}

/// Result type for the billscan library.
pub type Result<T> = std::result::Result<T, BillscanError>;
