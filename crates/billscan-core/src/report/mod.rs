//! Summary tables, spending aggregates and the PDF report.

mod aggregate;
mod charts;
mod document;
mod layout;

pub use aggregate::{
    quantile, spend_by_category, spend_over_time, spend_by_store, Kpis, SeriesPoint, OTHER_LABEL,
};
pub use layout::{string_width, wrap_text};

use std::path::{Path, PathBuf};

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

use crate::error::{ReportError, Result};
use crate::invoice::rules::format_amount;
use crate::models::config::ReportConfig;
use crate::models::record::{InvoiceRecord, NOT_AVAILABLE};
use crate::store::InvoiceStore;

use charts::ChartArea;
use document::{Align, Font, Page, ReportDocument, MARGIN, PAGE_HEIGHT, PAGE_WIDTH};
use layout::{layout_row, BODY_FONT_SIZE, COLUMN_WIDTHS, LINE_HEIGHT};

/// File name of the generated report.
pub const REPORT_FILE_NAME: &str = "invoices_summary.pdf";

/// Media type of the generated report.
pub const REPORT_MEDIA_TYPE: &str = "application/pdf";

/// Summary table column headers.
pub const SUMMARY_HEADERS: [&str; 6] = [
    "Bill ID",
    "Store Name",
    "GSTIN",
    "Date",
    "Category",
    "Total Amount",
];

const HEADER_HEIGHT: f32 = 8.0;
const BOTTOM_MARGIN: f32 = 15.0;
const TITLE_SIZE: f32 = 14.0;
const AMOUNT_LABEL: &str = "Total Amount (Rs.)";

/// One row of the summary table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryRow {
    #[serde(rename = "Bill ID")]
    pub bill_id: u32,
    #[serde(rename = "Store Name")]
    pub store_name: String,
    #[serde(rename = "GSTIN")]
    pub gstin: String,
    #[serde(rename = "Date")]
    pub date: String,
    #[serde(rename = "Category")]
    pub category: String,
    #[serde(rename = "Total Amount")]
    pub total_amount: String,
}

impl SummaryRow {
    fn from_record(record: &InvoiceRecord) -> Self {
        let or_na = |s: &str| {
            if s.trim().is_empty() {
                NOT_AVAILABLE.to_string()
            } else {
                s.to_string()
            }
        };
        let fields = &record.fields;
        Self {
            bill_id: record.id,
            store_name: or_na(&fields.store_name),
            gstin: or_na(&fields.gstin),
            date: or_na(&fields.date),
            category: fields.category.to_string(),
            total_amount: format_amount(fields.amount_or_zero()),
        }
    }

    /// Cell texts in column order.
    pub fn cells(&self) -> [String; 6] {
        [
            self.bill_id.to_string(),
            self.store_name.clone(),
            self.gstin.clone(),
            self.date.clone(),
            self.category.clone(),
            self.total_amount.clone(),
        ]
    }
}

/// The summary table with its total.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryTable {
    pub rows: Vec<SummaryRow>,
    pub total: Decimal,
}

impl SummaryTable {
    pub fn from_records(records: &[InvoiceRecord]) -> Self {
        Self {
            rows: records.iter().map(SummaryRow::from_record).collect(),
            total: records.iter().map(|r| r.fields.amount_or_zero()).sum(),
        }
    }

    /// The total formatted with two decimals.
    pub fn total_formatted(&self) -> String {
        format_amount(self.total)
    }
}

/// Plain-text table of the records, for the insights prompt.
pub fn insights_table(records: &[InvoiceRecord]) -> String {
    let mut out = String::from("id | store_name | date | bill_no | total_amount | category | gstin\n");
    for record in records {
        let f = &record.fields;
        out.push_str(&format!(
            "{} | {} | {} | {} | {} | {} | {}\n",
            record.id, f.store_name, f.date, f.bill_no, f.total_amount, f.category, f.gstin
        ));
    }
    out
}

/// Builds the summary PDF from a store.
pub struct ReportBuilder<'a> {
    store: &'a InvoiceStore,
    image_width: f32,
    other_quantile: f64,
}

impl<'a> ReportBuilder<'a> {
    pub fn new(store: &'a InvoiceStore) -> Self {
        let defaults = ReportConfig::default();
        Self {
            store,
            image_width: defaults.image_width_mm,
            other_quantile: defaults.other_quantile,
        }
    }

    /// Apply report settings from configuration.
    pub fn with_config(mut self, config: &ReportConfig) -> Self {
        self.image_width = config.image_width_mm;
        self.other_quantile = config.other_quantile;
        self
    }

    /// Set the width of source-image pages, in millimetres.
    pub fn with_image_width(mut self, width_mm: f32) -> Self {
        self.image_width = width_mm;
        self
    }

    /// Set the quantile below which categories are bucketed as "Other".
    pub fn with_other_quantile(mut self, q: f64) -> Self {
        self.other_quantile = q;
        self
    }

    pub fn summary(&self) -> SummaryTable {
        SummaryTable::from_records(self.store.records())
    }

    pub fn kpis(&self) -> Kpis {
        Kpis::from_records(self.store.records())
    }

    pub fn spend_by_category(&self) -> Vec<SeriesPoint> {
        spend_by_category(self.store.records(), self.other_quantile)
    }

    /// Render the full report.
    pub fn build_pdf(&self) -> Result<Vec<u8>> {
        let records = self.store.records();
        let mut document = ReportDocument::new();

        for page in self.summary_pages(&self.summary()) {
            document.add_page(page)?;
        }
        self.chart_pages(&mut document, records)?;

        for (id, image) in self.store.images() {
            let embedded = document
                .add_jpeg(image)
                .map_err(|e| ReportError::Image {
                    id,
                    reason: e.to_string(),
                })?;
            let (width, height) = fit_image(
                image.width() as f32,
                image.height() as f32,
                self.image_width,
            );
            let mut page = Page::new();
            page.image(embedded, MARGIN, MARGIN, width, height);
            document.add_page(page)?;
        }

        info!(
            pages = document.page_count(),
            invoices = records.len(),
            "Report rendered"
        );
        Ok(document.finish()?)
    }

    /// Render the report and write it as `invoices_summary.pdf` in `dir`.
    ///
    /// The file appears only when writing completes; a partial temp file is
    /// removed on failure.
    pub fn write_pdf(&self, dir: &Path) -> Result<PathBuf> {
        let bytes = self.build_pdf()?;
        let path = dir.join(REPORT_FILE_NAME);

        let mut file = tempfile::NamedTempFile::new_in(dir)?;
        std::io::Write::write_all(&mut file, &bytes)?;
        file.persist(&path).map_err(ReportError::Write)?;

        info!(path = %path.display(), bytes = bytes.len(), "Report written");
        Ok(path)
    }

    fn summary_pages(&self, table: &SummaryTable) -> Vec<Page> {
        let mut pages = Vec::new();
        let mut page = Page::new();
        let left = MARGIN;
        let table_width: f32 = COLUMN_WIDTHS.iter().sum();

        page.text_in_box(left, MARGIN, 200.0, 10.0, Font::Bold, TITLE_SIZE, Align::Center, "Invoice Summary");
        let mut y = MARGIN + 20.0;

        let mut x = left;
        for (header, width) in SUMMARY_HEADERS.iter().zip(COLUMN_WIDTHS) {
            page.rect(x, y, width, HEADER_HEIGHT);
            page.text_in_box(x, y, width, HEADER_HEIGHT, Font::Bold, BODY_FONT_SIZE, Align::Center, header);
            x += width;
        }
        y += HEADER_HEIGHT;

        for row in &table.rows {
            let wrapped = layout_row(&row.cells());
            if y + wrapped.height > PAGE_HEIGHT - BOTTOM_MARGIN {
                pages.push(std::mem::take(&mut page));
                y = MARGIN;
            }

            let mut x = left;
            for (lines, width) in wrapped.cells.iter().zip(COLUMN_WIDTHS) {
                for (i, line) in lines.iter().enumerate() {
                    page.text_in_box(
                        x,
                        y + LINE_HEIGHT * i as f32,
                        width,
                        LINE_HEIGHT,
                        Font::Regular,
                        BODY_FONT_SIZE,
                        Align::Left,
                        line,
                    );
                }
                page.rect(x, y, width, wrapped.height);
                x += width;
            }
            y += wrapped.height;
        }

        if y + HEADER_HEIGHT > PAGE_HEIGHT - BOTTOM_MARGIN {
            pages.push(std::mem::take(&mut page));
            y = MARGIN;
        }
        let label_width = table_width - COLUMN_WIDTHS[5];
        page.rect(left, y, label_width, HEADER_HEIGHT);
        page.text_in_box(left, y, label_width, HEADER_HEIGHT, Font::Bold, BODY_FONT_SIZE, Align::Right, "Total Amount");
        page.rect(left + label_width, y, COLUMN_WIDTHS[5], HEADER_HEIGHT);
        page.text_in_box(
            left + label_width,
            y,
            COLUMN_WIDTHS[5],
            HEADER_HEIGHT,
            Font::Bold,
            BODY_FONT_SIZE,
            Align::Center,
            &table.total_formatted(),
        );

        pages.push(page);
        debug!(pages = pages.len(), rows = table.rows.len(), "Summary table laid out");
        pages
    }

    fn chart_pages(&self, document: &mut ReportDocument, records: &[InvoiceRecord]) -> Result<()> {
        let chart_width = PAGE_WIDTH - 2.0 * MARGIN;

        let mut page = Page::new();
        page.text_in_box(MARGIN, MARGIN, 200.0, 10.0, Font::Bold, TITLE_SIZE, Align::Center, "Spending Trends");
        charts::pie(
            &mut page,
            ChartArea { x: MARGIN, y: 30.0, width: chart_width, height: 105.0 },
            "Spending by Category",
            &spend_by_category(records, self.other_quantile),
        );
        charts::line(
            &mut page,
            ChartArea { x: MARGIN, y: 140.0, width: chart_width, height: 140.0 },
            "Spending Trends Over Time",
            AMOUNT_LABEL,
            &spend_over_time(records),
        );
        document.add_page(page)?;

        let mut page = Page::new();
        charts::bar(
            &mut page,
            ChartArea { x: MARGIN, y: 30.0, width: chart_width, height: 140.0 },
            "Spending by Store",
            AMOUNT_LABEL,
            &spend_by_store(records),
        );
        document.add_page(page)?;
        Ok(())
    }
}

/// Size an image `width_mm` wide, shrinking it to fit inside the margins.
fn fit_image(pixel_width: f32, pixel_height: f32, width_mm: f32) -> (f32, f32) {
    let max_width = PAGE_WIDTH - 2.0 * MARGIN;
    let max_height = PAGE_HEIGHT - 2.0 * MARGIN;
    let aspect = pixel_height / pixel_width.max(1.0);

    let width = width_mm.min(max_width);
    let height = width * aspect;
    if height > max_height {
        (max_height / aspect, max_height)
    } else {
        (width, height)
    }
}
