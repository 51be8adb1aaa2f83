//! Near-duplicate detection over raw OCR text.

use serde::Serialize;
use tracing::debug;

use crate::models::record::InvoiceRecord;

/// Default similarity score at or above which an upload is a duplicate.
pub const DEFAULT_THRESHOLD: u8 = 90;

/// A stored record that an upload resembles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DuplicateMatch {
    /// Id of the stored record.
    pub id: u32,
    /// Similarity score (0 - 100).
    pub score: u8,
}

/// Compares new text against stored records.
#[derive(Debug, Clone, Copy)]
pub struct DuplicateDetector {
    threshold: u8,
}

impl DuplicateDetector {
    /// Create a detector with the given threshold (0 - 100).
    pub fn new(threshold: u8) -> Self {
        Self {
            threshold: threshold.min(100),
        }
    }

    /// The configured threshold.
    pub fn threshold(&self) -> u8 {
        self.threshold
    }

    /// Return the first stored record, in insertion order, whose score
    /// reaches the threshold.
    ///
    /// The first match wins even when a later record scores higher.
    pub fn check(&self, text: &str, stored: &[InvoiceRecord]) -> Option<DuplicateMatch> {
        let found = stored.iter().find_map(|record| {
            let score = similarity(text, &record.fields.extracted_text);
            self.is_duplicate(score).then_some(DuplicateMatch {
                id: record.id,
                score,
            })
        });

        debug!(
            stored = stored.len(),
            threshold = self.threshold,
            found = ?found,
            "Duplicate check"
        );
        found
    }

    /// Whether a score counts as a duplicate.
    pub fn is_duplicate(&self, score: u8) -> bool {
        score >= self.threshold
    }
}

impl Default for DuplicateDetector {
    fn default() -> Self {
        Self::new(DEFAULT_THRESHOLD)
    }
}

/// The highest-scoring stored record regardless of threshold.
///
/// Diagnostic only; the save flow uses [`DuplicateDetector::check`].
pub fn best_match(text: &str, stored: &[InvoiceRecord]) -> Option<DuplicateMatch> {
    stored
        .iter()
        .map(|record| DuplicateMatch {
            id: record.id,
            score: similarity(text, &record.fields.extracted_text),
        })
        .fold(None, |best: Option<DuplicateMatch>, m| match best {
            Some(b) if b.score >= m.score => Some(b),
            _ => Some(m),
        })
}

/// Similarity of two texts on a 0 - 100 scale.
///
/// Indel ratio over Unicode scalar values: `2 * M / T`, where `M` is the
/// length of the longest common subsequence and `T` the combined length.
/// Halves round to even. An empty text never matches anything.
pub fn similarity(a: &str, b: &str) -> u8 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() || b.is_empty() {
        return 0;
    }

    let matched = lcs_len(&a, &b);
    let total = a.len() + b.len();
    (200.0 * matched as f64 / total as f64).round_ties_even() as u8
}

/// Length of the longest common subsequence, one DP row at a time.
fn lcs_len(a: &[char], b: &[char]) -> usize {
    let (a, b) = if a.len() < b.len() { (b, a) } else { (a, b) };
    let mut row = vec![0usize; b.len() + 1];

    for &ca in a {
        let mut diagonal = 0;
        for (j, &cb) in b.iter().enumerate() {
            let above = row[j + 1];
            row[j + 1] = if ca == cb {
                diagonal + 1
            } else {
                above.max(row[j])
            };
            diagonal = above;
        }
    }
    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::record::RecordFields;

    fn record(id: u32, text: &str) -> InvoiceRecord {
        InvoiceRecord {
            id,
            fields: RecordFields::degraded(text),
        }
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("INVOICE 42", "INVOICE 42"), 100);
        assert_eq!(similarity("abc", "xyz"), 0);
        assert_eq!(similarity("", ""), 0);
        assert_eq!(similarity("abc", ""), 0);
    }

    #[test]
    fn test_similarity_one_edit_in_twenty() {
        // 1 substitution over 20 chars -> 95
        assert_eq!(similarity("CAFE MOCHA TOTAL 250", "CAFE MOCHA TOTAL 260"), 95);
    }

    #[test]
    fn test_similarity_counts_insertions_once() {
        let scanned = "CAFE MOCHA MG ROAD BENGALURU BILL NO 1042 DATE 05/03/2024 \
                       CAPPUCCINO 2 X 120.00 GST 10.00 TOTAL 250.00";
        let rescanned = format!("{} VISIT AGAIN :)", scanned);

        // 2 * 102 / 219
        assert_eq!(similarity(scanned, &rescanned), 93);

        let stored = vec![record(1, scanned)];
        let found = DuplicateDetector::default().check(&rescanned, &stored);
        assert_eq!(found, Some(DuplicateMatch { id: 1, score: 93 }));
    }

    #[test]
    fn test_similarity_is_symmetric_and_rounds_half_to_even() {
        assert_eq!(similarity("abcd", "abce"), similarity("abce", "abcd"));
        // 2 * 37 / 80 = 92.5
        let a = "x".repeat(37) + "abc";
        let b = "x".repeat(37) + "def";
        assert_eq!(similarity(&a, &b), 92);
        assert_eq!(lcs_len(&['a', 'b', 'c', 'd'], &['b', 'd']), 2);
    }

    #[test]
    fn test_check_finds_duplicate_above_threshold() {
        let stored = vec![
            record(1, "METRO CASH AND CARRY TOTAL 1200"),
            record(2, "CAFE MOCHA TOTAL 250"),
        ];
        let detector = DuplicateDetector::default();

        let found = detector.check("CAFE MOCHA TOTAL 260", &stored);
        assert_eq!(found, Some(DuplicateMatch { id: 2, score: 95 }));
    }

    #[test]
    fn test_check_below_threshold_is_none() {
        let stored = vec![record(1, "CAFE MOCHA TOTAL 250")];
        let detector = DuplicateDetector::default();

        assert_eq!(detector.check("UBER TRIP FARE 480", &stored), None);
    }

    #[test]
    fn test_check_empty_store_is_none() {
        let detector = DuplicateDetector::default();
        assert_eq!(detector.check("anything", &[]), None);
    }

    #[test]
    fn test_check_prefers_first_match_over_best() {
        let stored = vec![
            record(1, "CAFE MOCHA TOTAL 250"),
            record(2, "CAFE MOCHA TOTAL 260"),
        ];
        let detector = DuplicateDetector::new(90);

        let found = detector.check("CAFE MOCHA TOTAL 260", &stored).unwrap();
        assert_eq!(found.id, 1);
        assert_eq!(found.score, 95);

        let best = best_match("CAFE MOCHA TOTAL 260", &stored).unwrap();
        assert_eq!(best, DuplicateMatch { id: 2, score: 100 });
    }

    #[test]
    fn test_threshold_is_inclusive() {
        let stored = vec![record(7, "CAFE MOCHA TOTAL 250")];
        let detector = DuplicateDetector::new(95);
        assert_eq!(
            detector.check("CAFE MOCHA TOTAL 260", &stored),
            Some(DuplicateMatch { id: 7, score: 95 })
        );
        assert!(detector.is_duplicate(95));
        assert!(!detector.is_duplicate(94));
    }

    #[test]
    fn test_threshold_clamped() {
        assert_eq!(DuplicateDetector::new(250).threshold(), 100);
    }
}
