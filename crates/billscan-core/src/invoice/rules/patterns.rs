//! Common regex patterns for invoice extraction.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Markdown code fence around a model response
    pub static ref CODE_FENCE: Regex = Regex::new(
        r"(?s)```[a-zA-Z]*\s*(.*?)\s*```"
    ).unwrap();

    // Outermost JSON object, greedy across lines
    pub static ref JSON_OBJECT: Regex = Regex::new(
        r"(?s)\{.*\}"
    ).unwrap();

    // DD/MM/YYYY, DD.MM.YYYY or DD-MM-YYYY (two-digit years allowed)
    pub static ref DATE_DMY: Regex = Regex::new(
        r"^\s*(\d{1,2})[./\-](\d{1,2})[./\-](\d{4}|\d{2})\s*$"
    ).unwrap();

    // Currency marker in front of an amount
    pub static ref CURRENCY_PREFIX: Regex = Regex::new(
        r"(?i)^(?:₹|rs\.?|inr|\$)\s*"
    ).unwrap();

    // Currency marker after an amount
    pub static ref CURRENCY_SUFFIX: Regex = Regex::new(
        r"(?i)\s*(?:₹|rs\.?|inr|/-)$"
    ).unwrap();

    // Plain decimal number, optional sign, `,` thousands separators allowed
    pub static ref AMOUNT_NUMBER: Regex = Regex::new(
        r"^[+-]?(?:\d{1,3}(?:,\d{2,3})+|\d+)(?:\.\d+)?$"
    ).unwrap();

    // GSTIN layout: state code, PAN, entity code, 'Z', check character
    pub static ref GSTIN_PATTERN: Regex = Regex::new(
        r"^\d{2}[A-Z]{5}\d{4}[A-Z][1-9A-Z]Z[0-9A-Z]$"
    ).unwrap();
}
