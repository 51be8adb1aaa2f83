//! GSTIN (Indian Goods and Services Tax Identification Number) validation.

use super::patterns::GSTIN_PATTERN;

const CHARSET: &[u8; 36] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Normalize a GSTIN: uppercase, whitespace and dashes removed.
pub fn normalize_gstin(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace() && *c != '-')
        .flat_map(|c| c.to_uppercase())
        .collect()
}

/// Validate a GSTIN layout and its check character.
///
/// Format: 2-digit state code, 10-character PAN, entity number, `Z`, and a
/// check character over the first 14 characters (base 36, alternating
/// weights 1 and 2, digit sums of each product).
pub fn validate_gstin(raw: &str) -> bool {
    let gstin = normalize_gstin(raw);
    if !GSTIN_PATTERN.is_match(&gstin) {
        return false;
    }

    let bytes = gstin.as_bytes();
    match checksum_char(&bytes[..14]) {
        Some(expected) => expected == bytes[14],
        None => false,
    }
}

fn checksum_char(body: &[u8]) -> Option<u8> {
    let mut sum = 0u32;
    for (i, c) in body.iter().enumerate() {
        let value = CHARSET.iter().position(|x| x == c)? as u32;
        let factor = if i % 2 == 0 { 1 } else { 2 };
        let product = value * factor;
        sum += product / 36 + product % 36;
    }
    let check = (36 - sum % 36) % 36;
    Some(CHARSET[check as usize])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_gstin() {
        assert!(validate_gstin("27AAPFU0939F1ZV"));
        assert!(validate_gstin("33AAACH7409R1Z8"));
        assert!(validate_gstin("27 aapfu0939f1zv"));
    }

    #[test]
    fn test_invalid_check_character() {
        assert!(!validate_gstin("27AAPFU0939F1ZA"));
        assert!(!validate_gstin("29GGGGG1314R9Z6"));
    }

    #[test]
    fn test_invalid_layout() {
        assert!(!validate_gstin("N/A"));
        assert!(!validate_gstin("27AAPFU0939F1Z"));
        assert!(!validate_gstin("AAAPFU0939F1ZVV"));
    }

    #[test]
    fn test_normalize_gstin() {
        assert_eq!(normalize_gstin("27-aapfu 0939f1zv"), "27AAPFU0939F1ZV");
    }
}
