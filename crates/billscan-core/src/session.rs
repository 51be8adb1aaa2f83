//! One user session: collaborators, duplicate detector and store wired into
//! the upload flow.
//!
//! upload -> image -> (forgery check) -> OCR text -> fields -> duplicate check
//! -> saved, or pending until the caller confirms.
//!
//! A suspected forgery is held before the duplicate check. Accepting it runs
//! the check it skipped.

use image::DynamicImage;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::duplicate::{DuplicateDetector, DuplicateMatch};
use crate::error::Result;
use crate::forgery::{
    ForgeryDetector, ForgeryVerdict, NoForgeryCheck, DEFAULT_INTENSITY_THRESHOLD,
};
use crate::intake::Upload;
use crate::invoice::rules::validate_gstin;
use crate::invoice::{insights_prompt, EntityExtractor, InsightGenerator};
use crate::models::record::{InvoiceRecord, RecordFields, NOT_AVAILABLE};
use crate::ocr::TextExtractor;
use crate::pdf::PageRenderer;
use crate::report::insights_table;
use crate::store::InvoiceStore;

/// Result of submitting one upload.
#[derive(Debug)]
pub struct Submission {
    /// Saved or held back as a duplicate.
    pub outcome: Outcome,
    /// Non-fatal issues found while processing.
    pub warnings: Vec<String>,
    /// Forgery heatmap, when a detector is configured and reported one.
    pub heatmap: Option<DynamicImage>,
    /// Score of the heatmap, when there is one.
    pub forgery: Option<ForgeryVerdict>,
}

/// What happened to an upload.
#[derive(Debug)]
pub enum Outcome {
    /// Stored under a new id.
    Saved(InvoiceRecord),
    /// Resembles a stored record; not saved until confirmed.
    Duplicate(PendingSubmission),
    /// Heatmap intensity is above the threshold; not checked for duplicates
    /// or saved until accepted.
    Forged(SuspectSubmission),
}

/// A duplicate-flagged upload awaiting a decision.
#[derive(Debug)]
pub struct PendingSubmission {
    /// Upload file name.
    pub name: String,
    /// The stored record it resembles.
    pub existing: DuplicateMatch,
    /// Extracted fields.
    pub fields: RecordFields,
    image: DynamicImage,
}

impl PendingSubmission {
    /// The uploaded image, for side-by-side comparison.
    pub fn image(&self) -> &DynamicImage {
        &self.image
    }
}

/// An upload held back as a suspected forgery.
#[derive(Debug)]
pub struct SuspectSubmission {
    /// Upload file name.
    pub name: String,
    /// The heatmap score that flagged it.
    pub verdict: ForgeryVerdict,
    /// Extracted fields.
    pub fields: RecordFields,
    image: DynamicImage,
}

/// Session state and the collaborators that feed it.
pub struct Session<T, E, F = NoForgeryCheck> {
    ocr: T,
    extractor: E,
    forgery: F,
    forgery_threshold: f64,
    renderer: PageRenderer,
    detector: DuplicateDetector,
    store: InvoiceStore,
}

impl<T, E> Session<T, E, NoForgeryCheck>
where
    T: TextExtractor,
    E: EntityExtractor,
{
    /// Create a session with an empty store and no forgery checks.
    pub fn new(ocr: T, extractor: E, detector: DuplicateDetector) -> Self {
        Self {
            ocr,
            extractor,
            forgery: NoForgeryCheck,
            forgery_threshold: DEFAULT_INTENSITY_THRESHOLD,
            renderer: PageRenderer::default(),
            detector,
            store: InvoiceStore::new(),
        }
    }
}

impl<T, E, F> Session<T, E, F>
where
    T: TextExtractor,
    E: EntityExtractor,
    F: ForgeryDetector,
{
    /// Run every upload through a forgery detector first.
    pub fn with_forgery_detector<G: ForgeryDetector>(self, forgery: G) -> Session<T, E, G> {
        Session {
            ocr: self.ocr,
            extractor: self.extractor,
            forgery,
            forgery_threshold: self.forgery_threshold,
            renderer: self.renderer,
            detector: self.detector,
            store: self.store,
        }
    }

    /// Set the mean heatmap intensity above which uploads are held.
    pub fn with_forgery_threshold(mut self, threshold: f64) -> Self {
        self.forgery_threshold = threshold;
        self
    }

    /// Render PDF uploads with this renderer.
    pub fn with_page_renderer(mut self, renderer: PageRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    /// Process one upload.
    ///
    /// Fails only when the upload cannot be decoded or the OCR call fails.
    /// Extraction problems degrade the record and add a warning instead.
    pub async fn submit(&mut self, upload: &Upload) -> Result<Submission> {
        let image = upload.decode(&self.renderer)?;
        let mut warnings = Vec::new();

        let heatmap = match self.forgery.detect_forgery(&image).await {
            Ok(heatmap) => heatmap,
            Err(e) => {
                warn!(error = %e, upload = %upload.name, "Forgery detection failed");
                warnings.push(format!("Forgery detection failed: {}", e));
                None
            }
        };
        let forgery = heatmap
            .as_ref()
            .map(|h| ForgeryVerdict::from_heatmap(h, self.forgery_threshold));

        let text = self.ocr.extract_text(&image).await?;
        if text.trim().is_empty() {
            warn!(upload = %upload.name, "No text detected");
            warnings.push("No text detected in the image".to_string());
        }

        let fields = match self.extractor.extract_entities(&text).await {
            Ok(fields) => fields,
            Err(e) => {
                warn!(error = %e, upload = %upload.name, "Field extraction failed");
                warnings.push(format!("Field extraction failed: {}", e));
                RecordFields::degraded(text.as_str())
            }
        };
        warnings.extend(field_warnings(&fields));

        let outcome = match forgery {
            Some(verdict) if verdict.forged => {
                warn!(
                    upload = %upload.name,
                    intensity = verdict.intensity,
                    threshold = verdict.threshold,
                    "Invoice appears to be forged"
                );
                Outcome::Forged(SuspectSubmission {
                    name: upload.name.clone(),
                    verdict,
                    fields,
                    image,
                })
            }
            _ => self.check_and_save(upload.name.clone(), fields, image),
        };

        Ok(Submission {
            outcome,
            warnings,
            heatmap,
            forgery,
        })
    }

    /// Accept a suspected forgery and continue with the duplicate check.
    ///
    /// Never returns [`Outcome::Forged`].
    pub fn accept_suspect(&mut self, suspect: SuspectSubmission) -> Outcome {
        info!(
            upload = %suspect.name,
            intensity = suspect.verdict.intensity,
            "Accepting suspected forgery"
        );
        self.check_and_save(suspect.name, suspect.fields, suspect.image)
    }

    fn check_and_save(
        &mut self,
        name: String,
        fields: RecordFields,
        image: DynamicImage,
    ) -> Outcome {
        match self.detector.check(&fields.extracted_text, self.store.records()) {
            Some(existing) => {
                warn!(
                    upload = %name,
                    existing_id = existing.id,
                    score = existing.score,
                    "Duplicate invoice detected"
                );
                Outcome::Duplicate(PendingSubmission {
                    name,
                    existing,
                    fields,
                    image,
                })
            }
            None => {
                let id = self.store.save(fields.clone(), image);
                Outcome::Saved(InvoiceRecord { id, fields })
            }
        }
    }

    /// Save a duplicate-flagged upload anyway.
    pub fn confirm(&mut self, pending: PendingSubmission) -> u32 {
        info!(
            upload = %pending.name,
            existing_id = pending.existing.id,
            "Saving duplicate on confirmation"
        );
        self.store.save(pending.fields, pending.image)
    }

    /// Ask an insight generator to analyse the stored records.
    pub async fn insights<G: InsightGenerator>(&self, generator: &G) -> Result<String> {
        if self.store.is_empty() {
            return Ok("No data available for insights.".to_string());
        }
        let prompt = insights_prompt(&insights_table(self.store.records()));
        generator.generate_insights(&prompt).await
    }

    /// Sum of all stored totals.
    pub fn total(&self) -> Decimal {
        self.store.total()
    }

    /// Drop all records and images.
    pub fn clear(&mut self) {
        self.store.clear();
    }

    /// Read access to the store.
    pub fn store(&self) -> &InvoiceStore {
        &self.store
    }

    /// The duplicate detector in use.
    pub fn detector(&self) -> &DuplicateDetector {
        &self.detector
    }
}

/// Warnings about suspicious extracted values.
fn field_warnings(fields: &RecordFields) -> Vec<String> {
    let mut warnings = Vec::new();

    if fields.is_degraded() {
        warnings.push("No invoice fields could be extracted".to_string());
        return warnings;
    }

    if fields.amount().is_none() {
        warnings.push(format!(
            "Total amount '{}' is not numeric and counts as 0",
            fields.total_amount
        ));
    }

    if fields.gstin != NOT_AVAILABLE && !validate_gstin(&fields.gstin) {
        warnings.push(format!("GSTIN '{}' failed validation", fields.gstin));
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{BillscanError, ServiceError};
    use crate::models::record::Category;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io::Cursor;

    /// OCR fake: the text is looked up by image width.
    struct FakeOcr(HashMap<u32, String>);

    impl TextExtractor for FakeOcr {
        async fn extract_text(&self, image: &DynamicImage) -> Result<String> {
            Ok(self.0.get(&image.width()).cloned().unwrap_or_default())
        }
    }

    /// Extractor fake: stores name is the first line of the text.
    struct FakeExtractor {
        fail: bool,
    }

    impl EntityExtractor for FakeExtractor {
        async fn extract_entities(&self, text: &str) -> Result<RecordFields> {
            if self.fail {
                return Err(ServiceError::InvalidResponse {
                    service: "fake",
                    reason: "offline".to_string(),
                }
                .into());
            }
            Ok(RecordFields {
                store_name: text.lines().next().unwrap_or_default().to_string(),
                date: "05/03/2024".to_string(),
                bill_no: "1".to_string(),
                total_amount: "100".to_string(),
                category: Category::Food,
                gstin: "27AAPFU0939F1ZV".to_string(),
                extracted_text: text.to_string(),
            })
        }
    }

    struct FailingForgery;

    impl ForgeryDetector for FailingForgery {
        async fn detect_forgery(&self, _image: &DynamicImage) -> Result<Option<DynamicImage>> {
            Err(BillscanError::Config("no token".to_string()))
        }
    }

    /// Forgery fake: always reports a uniform heatmap of the given gray level.
    struct FlatHeatmap(u8);

    impl ForgeryDetector for FlatHeatmap {
        async fn detect_forgery(&self, _image: &DynamicImage) -> Result<Option<DynamicImage>> {
            Ok(Some(DynamicImage::ImageLuma8(image::GrayImage::from_pixel(
                4,
                4,
                image::Luma([self.0]),
            ))))
        }
    }

    struct RecordingInsights(RefCell<Option<String>>);

    impl InsightGenerator for RecordingInsights {
        async fn generate_insights(&self, prompt: &str) -> Result<String> {
            *self.0.borrow_mut() = Some(prompt.to_string());
            Ok("- Spend less on coffee".to_string())
        }
    }

    fn png_upload(name: &str, width: u32) -> Upload {
        let mut data = Vec::new();
        DynamicImage::new_rgb8(width, 2)
            .write_to(&mut Cursor::new(&mut data), image::ImageFormat::Png)
            .unwrap();
        Upload::new(name, None, data).unwrap()
    }

    fn session(fail: bool) -> Session<FakeOcr, FakeExtractor> {
        let texts = HashMap::from([
            (10, "CAFE MOCHA TOTAL 250".to_string()),
            (11, "CAFE MOCHA TOTAL 260".to_string()),
            (12, "UBER TRIP FARE 480".to_string()),
        ]);
        Session::new(
            FakeOcr(texts),
            FakeExtractor { fail },
            DuplicateDetector::default(),
        )
    }

    #[tokio::test]
    async fn test_new_upload_is_saved() {
        let mut session = session(false);

        let submission = session.submit(&png_upload("a.png", 10)).await.unwrap();

        match submission.outcome {
            Outcome::Saved(record) => {
                assert_eq!(record.id, 1);
                assert_eq!(record.fields.store_name, "CAFE MOCHA TOTAL 250");
            }
            other => panic!("expected saved, got {:?}", other),
        }
        assert!(submission.warnings.is_empty());
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_is_held_until_confirmed() {
        let mut session = session(false);
        session.submit(&png_upload("a.png", 10)).await.unwrap();
        session.submit(&png_upload("b.png", 12)).await.unwrap();

        let submission = session.submit(&png_upload("c.png", 11)).await.unwrap();
        let pending = match submission.outcome {
            Outcome::Duplicate(pending) => pending,
            other => panic!("expected duplicate, got {:?}", other),
        };
        assert_eq!(pending.existing, DuplicateMatch { id: 1, score: 95 });
        assert_eq!(pending.image().width(), 11);
        assert_eq!(session.store().len(), 2);

        let id = session.confirm(pending);
        assert_eq!(id, 3);
        assert_eq!(session.total(), Decimal::from(300));
    }

    #[tokio::test]
    async fn test_extraction_failure_degrades() {
        let mut session = session(true);

        let submission = session.submit(&png_upload("a.png", 12)).await.unwrap();

        let Outcome::Saved(record) = submission.outcome else {
            panic!("expected saved");
        };
        assert!(record.fields.is_degraded());
        assert_eq!(record.fields.extracted_text, "UBER TRIP FARE 480");
        assert!(submission.warnings[0].contains("offline"));
    }

    #[tokio::test]
    async fn test_forgery_failure_is_a_warning() {
        let mut session = session(false).with_forgery_detector(FailingForgery);

        let submission = session.submit(&png_upload("a.png", 10)).await.unwrap();

        assert!(matches!(submission.outcome, Outcome::Saved(_)));
        assert!(submission.heatmap.is_none());
        assert!(submission.warnings[0].starts_with("Forgery detection failed"));
    }

    #[tokio::test]
    async fn test_empty_text_warns() {
        let mut session = session(false);
        let submission = session.submit(&png_upload("a.png", 99)).await.unwrap();
        assert!(submission.warnings.iter().any(|w| w.contains("No text")));
    }

    #[tokio::test]
    async fn test_clear_resets_total_and_images() {
        let mut session = session(false);
        session.submit(&png_upload("a.png", 10)).await.unwrap();

        session.clear();

        assert_eq!(session.total(), Decimal::ZERO);
        assert_eq!(session.store().images().count(), 0);
    }

    #[tokio::test]
    async fn test_insights() {
        let generator = RecordingInsights(RefCell::new(None));
        let mut session = session(false);

        let empty = session.insights(&generator).await.unwrap();
        assert_eq!(empty, "No data available for insights.");
        assert!(generator.0.borrow().is_none());

        session.submit(&png_upload("a.png", 10)).await.unwrap();
        let text = session.insights(&generator).await.unwrap();

        assert_eq!(text, "- Spend less on coffee");
        let prompt = generator.0.borrow().clone().unwrap();
        assert!(prompt.contains("CAFE MOCHA TOTAL 250"));
    }

    #[test]
    fn test_field_warnings() {
        let mut fields = RecordFields {
            store_name: "Shop".to_string(),
            total_amount: "twelve".to_string(),
            gstin: "29GGGGG1314R9Z6".to_string(),
            ..RecordFields::degraded("t")
        };
        let warnings = field_warnings(&fields);
        assert_eq!(warnings.len(), 2);

        fields.total_amount = "12".to_string();
        fields.gstin = NOT_AVAILABLE.to_string();
        assert!(field_warnings(&fields).is_empty());
    }

    #[tokio::test]
    async fn test_bright_heatmap_is_held_as_forged() {
        let mut session = session(false).with_forgery_detector(FlatHeatmap(220));

        let submission = session.submit(&png_upload("a.png", 10)).await.unwrap();

        let verdict = submission.forgery.unwrap();
        assert_eq!(verdict.intensity, 220.0);
        assert!(verdict.forged);
        let Outcome::Forged(suspect) = submission.outcome else {
            panic!("expected forged");
        };
        assert_eq!(suspect.fields.store_name, "CAFE MOCHA TOTAL 250");
        assert!(session.store().is_empty());

        match session.accept_suspect(suspect) {
            Outcome::Saved(record) => assert_eq!(record.id, 1),
            other => panic!("expected saved, got {:?}", other),
        }
        assert_eq!(session.store().len(), 1);
    }

    #[tokio::test]
    async fn test_dark_heatmap_passes() {
        let mut session = session(false).with_forgery_detector(FlatHeatmap(30));

        let submission = session.submit(&png_upload("a.png", 10)).await.unwrap();

        assert!(matches!(submission.outcome, Outcome::Saved(_)));
        assert!(submission.heatmap.is_some());
        assert!(!submission.forgery.unwrap().forged);
    }

    #[tokio::test]
    async fn test_accepted_suspect_still_checked_for_duplicates() {
        let mut session = session(false)
            .with_forgery_detector(FlatHeatmap(120))
            .with_forgery_threshold(100.0);

        let first = session.submit(&png_upload("a.png", 10)).await.unwrap();
        let Outcome::Forged(first) = first.outcome else {
            panic!("expected forged");
        };
        session.accept_suspect(first);

        let second = session.submit(&png_upload("b.png", 11)).await.unwrap();
        let Outcome::Forged(second) = second.outcome else {
            panic!("expected forged");
        };
        match session.accept_suspect(second) {
            Outcome::Duplicate(pending) => assert_eq!(pending.existing.id, 1),
            other => panic!("expected duplicate, got {:?}", other),
        }
    }
}
