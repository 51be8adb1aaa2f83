//! Amount parsing for extracted totals.

use std::str::FromStr;

use rust_decimal::Decimal;

use super::patterns::{AMOUNT_NUMBER, CURRENCY_PREFIX, CURRENCY_SUFFIX};

/// Parse an extracted total into a decimal.
///
/// Accepts `1234.50`, `1,234.50`, Indian grouping (`1,23,456.00`) and a
/// leading or trailing currency marker (`₹`, `Rs.`, `INR`, `$`, `/-`).
/// Anything else is non-numeric and yields `None`.
pub fn parse_amount(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    let without_prefix = CURRENCY_PREFIX.replace(trimmed, "");
    let cleaned = CURRENCY_SUFFIX.replace(without_prefix.trim(), "");
    let cleaned = cleaned.trim();

    if !AMOUNT_NUMBER.is_match(cleaned) {
        return None;
    }

    Decimal::from_str(&cleaned.replace(',', "")).ok()
}

/// Format an amount with two decimal places.
pub fn format_amount(amount: Decimal) -> String {
    format!("{:.2}", amount.round_dp(2))
}
