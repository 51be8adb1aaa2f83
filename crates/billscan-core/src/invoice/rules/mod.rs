//! Rule-based helpers for extracted invoice fields.

pub mod amounts;
pub mod dates;
pub mod gstin;
pub mod patterns;

pub use amounts::{format_amount, parse_amount};
pub use dates::parse_dmy;
pub use gstin::{normalize_gstin, validate_gstin};
