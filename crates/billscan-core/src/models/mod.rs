//! Data models: invoice records and configuration.

pub mod config;
pub mod record;

pub use config::BillscanConfig;
pub use record::{Category, InvoiceRecord, RecordFields, NOT_AVAILABLE};
