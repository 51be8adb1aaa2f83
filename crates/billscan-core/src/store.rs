//! Session-scoped, append-only invoice store.

use std::collections::BTreeMap;

use image::DynamicImage;
use rust_decimal::Decimal;
use tracing::info;

use crate::models::record::{InvoiceRecord, RecordFields};

/// Records of the current session and their source images.
///
/// Ids are `len + 1` at save time. The only removal is [`InvoiceStore::clear`],
/// so ids are gap-free and every stored image has a record.
#[derive(Debug, Default)]
pub struct InvoiceStore {
    records: Vec<InvoiceRecord>,
    images: BTreeMap<u32, DynamicImage>,
}

impl InvoiceStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a record and its source image, returning the assigned id.
    pub fn save(&mut self, fields: RecordFields, image: DynamicImage) -> u32 {
        let id = self.records.len() as u32 + 1;
        self.records.push(InvoiceRecord { id, fields });
        self.images.insert(id, image);
        info!(id, "Invoice saved");
        id
    }

    /// Look up a record by id.
    pub fn get(&self, id: u32) -> Option<&InvoiceRecord> {
        // ids are 1-based positions
        let index = usize::try_from(id).ok()?.checked_sub(1)?;
        self.records.get(index)
    }

    /// Source image of a record.
    pub fn image(&self, id: u32) -> Option<&DynamicImage> {
        self.images.get(&id)
    }

    /// All records in insertion order.
    pub fn records(&self) -> &[InvoiceRecord] {
        &self.records
    }

    /// All images in id order.
    pub fn images(&self) -> impl Iterator<Item = (u32, &DynamicImage)> {
        self.images.iter().map(|(id, img)| (*id, img))
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Sum of all totals; missing or non-numeric amounts count as zero.
    pub fn total(&self) -> Decimal {
        self.records.iter().map(|r| r.fields.amount_or_zero()).sum()
    }

    /// Drop every record and image.
    pub fn clear(&mut self) {
        let count = self.records.len();
        self.records.clear();
        self.images.clear();
        info!(count, "Store cleared");
    }
}
