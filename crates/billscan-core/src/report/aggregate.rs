//! Spending aggregations behind the charts and the dashboard KPIs.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::Serialize;

use crate::invoice::rules::parse_dmy;
use crate::models::record::{Category, InvoiceRecord};

/// Label of the bucket that collects small categories.
pub const OTHER_LABEL: &str = "Other";

/// One labelled value of a chart series.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SeriesPoint {
    pub label: String,
    pub value: Decimal,
}

impl SeriesPoint {
    fn new(label: impl Into<String>, value: Decimal) -> Self {
        Self {
            label: label.into(),
            value,
        }
    }
}

/// Records with a numeric amount. Non-numeric amounts are left out of charts.
fn numeric(records: &[InvoiceRecord]) -> impl Iterator<Item = (&InvoiceRecord, Decimal)> {
    records
        .iter()
        .filter_map(|r| r.fields.amount().map(|amount| (r, amount)))
}

/// Spend per category, with categories below the `other_quantile` of all
/// category totals merged into an "Other" bucket placed last.
pub fn spend_by_category(records: &[InvoiceRecord], other_quantile: f64) -> Vec<SeriesPoint> {
    let mut totals: BTreeMap<Category, Decimal> = BTreeMap::new();
    for (record, amount) in numeric(records) {
        *totals.entry(record.fields.category).or_default() += amount;
    }

    let values: Vec<f64> = totals.values().filter_map(|v| v.to_f64()).collect();
    let Some(cutoff) = quantile(&values, other_quantile) else {
        return Vec::new();
    };

    let mut series = Vec::new();
    let mut other = Decimal::ZERO;
    let mut has_other = false;
    for (category, total) in totals {
        if total.to_f64().is_some_and(|v| v < cutoff) {
            other += total;
            has_other = true;
        } else {
            series.push(SeriesPoint::new(category.as_str(), total));
        }
    }
    if has_other {
        series.push(SeriesPoint::new(OTHER_LABEL, other));
    }
    series
}

/// Spend per literal date label.
///
/// Labels that parse as `DD/MM/YYYY` come first in calendar order, the rest
/// follow in lexical order.
pub fn spend_over_time(records: &[InvoiceRecord]) -> Vec<SeriesPoint> {
    let mut totals: HashMap<&str, Decimal> = HashMap::new();
    for (record, amount) in numeric(records) {
        *totals.entry(record.fields.date.as_str()).or_default() += amount;
    }

    let mut keyed: Vec<(Option<NaiveDate>, &str, Decimal)> = totals
        .into_iter()
        .map(|(label, total)| (parse_dmy(label), label, total))
        .collect();
    keyed.sort_by(|a, b| match (a.0, b.0) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.1.cmp(b.1)),
        (Some(_), None) => std::cmp::Ordering::Less,
        (None, Some(_)) => std::cmp::Ordering::Greater,
        (None, None) => a.1.cmp(b.1),
    });

    keyed
        .into_iter()
        .map(|(_, label, total)| SeriesPoint::new(label, total))
        .collect()
}

/// Spend per store name, in lexical order.
pub fn spend_by_store(records: &[InvoiceRecord]) -> Vec<SeriesPoint> {
    let mut totals: BTreeMap<&str, Decimal> = BTreeMap::new();
    for (record, amount) in numeric(records) {
        *totals.entry(record.fields.store_name.as_str()).or_default() += amount;
    }
    totals
        .into_iter()
        .map(|(label, total)| SeriesPoint::new(label, total))
        .collect()
}

/// Quantile with linear interpolation between closest ranks.
///
/// `None` for an empty sample.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));

    let position = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = position.floor() as usize;
    let upper = position.ceil() as usize;
    let fraction = position - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * fraction)
}

/// Dashboard headline numbers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Kpis {
    /// Number of stored invoices.
    pub invoice_count: usize,
    /// Sum of all totals.
    pub total_spend: Decimal,
    /// Mean invoice total, zero when there are no invoices.
    pub average_invoice: Decimal,
    /// Category with the highest spend.
    pub top_category: Option<SeriesPoint>,
}

impl Kpis {
    pub fn from_records(records: &[InvoiceRecord]) -> Self {
        let total_spend: Decimal = records.iter().map(|r| r.fields.amount_or_zero()).sum();
        let average_invoice = if records.is_empty() {
            Decimal::ZERO
        } else {
            (total_spend / Decimal::from(records.len())).round_dp(2)
        };

        let mut by_category: BTreeMap<Category, Decimal> = BTreeMap::new();
        for record in records {
            *by_category.entry(record.fields.category).or_default() +=
                record.fields.amount_or_zero();
        }
        // first category wins a tie
        let top_category = by_category
            .into_iter()
            .fold(None, |best: Option<(Category, Decimal)>, (c, v)| match best {
                Some((_, b)) if b >= v => best,
                _ => Some((c, v)),
            })
            .map(|(c, v)| SeriesPoint::new(c.as_str(), v));

        Self {
            invoice_count: records.len(),
            total_spend,
            average_invoice,
            top_category,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordFields;
    use pretty_assertions::assert_eq;

    fn record(id: u32, category: Category, date: &str, store: &str, amount: &str) -> InvoiceRecord {
        InvoiceRecord {
            id,
            fields: RecordFields {
                store_name: store.to_string(),
                date: date.to_string(),
                total_amount: amount.to_string(),
                category,
                ..RecordFields::degraded(format!("invoice {}", id))
            },
        }
    }

    fn point(label: &str, value: i64) -> SeriesPoint {
        SeriesPoint::new(label, Decimal::from(value))
    }

    #[test]
    fn test_quantile_linear() {
        assert_eq!(quantile(&[], 0.05), None);
        assert_eq!(quantile(&[7.0], 0.05), Some(7.0));
        let q = quantile(&[10.0, 1.0], 0.05).unwrap();
        assert!((q - 1.45).abs() < 1e-9);
        assert_eq!(quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.5), Some(3.0));
    }

    #[test]
    fn test_small_category_goes_to_other() {
        let records = vec![
            record(1, Category::Food, "01/01/2024", "A", "10"),
            record(2, Category::Travel, "01/01/2024", "B", "1"),
        ];
        assert_eq!(
            spend_by_category(&records, 0.05),
            vec![point("Food", 10), point("Other", 1)]
        );
    }

    #[test]
    fn test_equal_categories_stay() {
        let records = vec![
            record(1, Category::Utilities, "x", "A", "5"),
            record(2, Category::Food, "x", "B", "5"),
        ];
        assert_eq!(
            spend_by_category(&records, 0.05),
            vec![point("Food", 5), point("Utilities", 5)]
        );
    }

    #[test]
    fn test_non_numeric_amounts_are_dropped() {
        let records = vec![
            record(1, Category::Food, "01/01/2024", "A", "abc"),
            record(2, Category::Food, "01/01/2024", "A", "20"),
        ];
        assert_eq!(spend_by_category(&records, 0.05), vec![point("Food", 20)]);
        assert_eq!(spend_by_store(&records), vec![point("A", 20)]);
        assert!(spend_by_category(&records[..1], 0.05).is_empty());
    }

    #[test]
    fn test_spend_over_time_order() {
        let records = vec![
            record(1, Category::Food, "N/A", "A", "1"),
            record(2, Category::Food, "02/01/2024", "A", "2"),
            record(3, Category::Food, "15/12/2023", "A", "3"),
            record(4, Category::Food, "02/01/2024", "A", "4"),
            record(5, Category::Food, "March 2024", "A", "5"),
        ];
        assert_eq!(
            spend_over_time(&records),
            vec![
                point("15/12/2023", 3),
                point("02/01/2024", 6),
                point("March 2024", 5),
                point("N/A", 1),
            ]
        );
    }

    #[test]
    fn test_spend_by_store() {
        let records = vec![
            record(1, Category::Food, "x", "Zed Mart", "1"),
            record(2, Category::Food, "x", "Apex", "2"),
            record(3, Category::Food, "x", "Zed Mart", "3"),
        ];
        assert_eq!(
            spend_by_store(&records),
            vec![point("Apex", 2), point("Zed Mart", 4)]
        );
    }

    #[test]
    fn test_kpis() {
        let records = vec![
            record(1, Category::Food, "x", "A", "100"),
            record(2, Category::Travel, "x", "B", "250"),
            record(3, Category::Food, "x", "C", "bad"),
        ];
        let kpis = Kpis::from_records(&records);

        assert_eq!(kpis.invoice_count, 3);
        assert_eq!(kpis.total_spend, Decimal::from(350));
        assert_eq!(kpis.average_invoice, Decimal::new(11667, 2));
        assert_eq!(kpis.top_category, Some(point("Travel", 250)));
    }

    #[test]
    fn test_kpis_empty() {
        let kpis = Kpis::from_records(&[]);
        assert_eq!(kpis.invoice_count, 0);
        assert_eq!(kpis.average_invoice, Decimal::ZERO);
        assert_eq!(kpis.top_category, None);
    }
}
