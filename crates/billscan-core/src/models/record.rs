//! Invoice record models.

use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::invoice::rules::amounts::parse_amount;

/// Placeholder for fields the extractor could not populate.
pub const NOT_AVAILABLE: &str = "N/A";

/// Spending category assigned by the field extractor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    Food,
    Travel,
    OfficeSupplies,
    Utilities,
    /// Fallback when nothing else matches.
    #[default]
    Others,
}

impl Category {
    /// All categories in display order.
    pub const ALL: [Category; 5] = [
        Category::Food,
        Category::Travel,
        Category::OfficeSupplies,
        Category::Utilities,
        Category::Others,
    ];

    /// Display name, as used in prompts, tables and JSON.
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Food => "Food",
            Category::Travel => "Travel",
            Category::OfficeSupplies => "Office Supplies",
            Category::Utilities => "Utilities",
            Category::Others => "Others",
        }
    }

    /// Map a free-form label onto the closed set. Unknown labels become `Others`.
    pub fn from_label(label: &str) -> Self {
        let label = label.trim();
        Self::ALL
            .into_iter()
            .find(|c| c.as_str().eq_ignore_ascii_case(label))
            .unwrap_or_default()
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for Category {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Category {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let label = Option::<String>::deserialize(deserializer)?;
        Ok(label.map(|l| Self::from_label(&l)).unwrap_or_default())
    }
}

/// Structured fields extracted from one invoice, before it is saved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordFields {
    /// Merchant or store name.
    pub store_name: String,

    /// Invoice date as extracted, nominally `DD/MM/YYYY`.
    pub date: String,

    /// Bill / invoice number.
    pub bill_no: String,

    /// Total amount as extracted. May be non-numeric.
    pub total_amount: String,

    /// Spending category.
    pub category: Category,

    /// Indian GST identification number.
    pub gstin: String,

    /// Full raw OCR text, kept for duplicate comparisons.
    pub extracted_text: String,
}

impl RecordFields {
    /// The record produced when structured extraction fails.
    pub fn degraded(extracted_text: impl Into<String>) -> Self {
        Self {
            store_name: NOT_AVAILABLE.to_string(),
            date: NOT_AVAILABLE.to_string(),
            bill_no: NOT_AVAILABLE.to_string(),
            total_amount: "0".to_string(),
            category: Category::Others,
            gstin: NOT_AVAILABLE.to_string(),
            extracted_text: extracted_text.into(),
        }
    }

    /// Parsed total amount, `None` when missing or non-numeric.
    pub fn amount(&self) -> Option<Decimal> {
        parse_amount(&self.total_amount)
    }

    /// Parsed total amount with missing/non-numeric treated as zero.
    pub fn amount_or_zero(&self) -> Decimal {
        self.amount().unwrap_or(Decimal::ZERO)
    }

    /// Whether every extracted field is still a placeholder.
    pub fn is_degraded(&self) -> bool {
        self.store_name == NOT_AVAILABLE
            && self.date == NOT_AVAILABLE
            && self.bill_no == NOT_AVAILABLE
            && self.gstin == NOT_AVAILABLE
            && self.amount_or_zero().is_zero()
    }
}

/// A saved invoice. Immutable once the store hands it out.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    /// Session-unique id, assigned at save time.
    pub id: u32,

    #[serde(flatten)]
    pub fields: RecordFields,
}
