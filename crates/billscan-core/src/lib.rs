//! Core library for invoice capture and spend reporting.
//!
//! This crate provides:
//! - Upload intake (PNG/JPEG images, scanned PDFs)
//! - OCR through Google Cloud Vision
//! - Structured field extraction and spending insights through Gemini
//! - Near-duplicate detection over raw OCR text
//! - A session-scoped invoice store
//! - Optional forgery detection through Replicate
//! - Summary tables, spending charts and a PDF report

pub mod duplicate;
pub mod error;
pub mod forgery;
pub mod intake;
pub mod invoice;
pub mod models;
pub mod ocr;
pub mod pdf;
pub mod report;
pub mod session;
pub mod store;

mod service;

pub use duplicate::{DuplicateDetector, DuplicateMatch};
pub use error::{BillscanError, Result};
pub use forgery::{ForgeryDetector, ForgeryVerdict, NoForgeryCheck, ReplicateClient};
pub use intake::{Upload, UploadKind};
pub use invoice::{EntityExtractor, GeminiClient, InsightGenerator, PromptBuilder};
pub use models::{BillscanConfig, Category, InvoiceRecord, RecordFields, NOT_AVAILABLE};
pub use ocr::{TextExtractor, VisionClient};
pub use pdf::PageRenderer;
pub use report::{Kpis, ReportBuilder, SummaryTable, REPORT_FILE_NAME, REPORT_MEDIA_TYPE};
pub use session::{Outcome, PendingSubmission, Session, Submission, SuspectSubmission};
pub use store::InvoiceStore;
