//! Date parsing for chart ordering.
//!
//! Dates stay free-form strings on the record; parsing is only used to order
//! groups of identical date labels on the time chart.

use chrono::NaiveDate;

use super::patterns::DATE_DMY;

/// Parse a `DD/MM/YYYY` style label (also `.` or `-` separated).
///
/// Two-digit years are read as 20YY.
pub fn parse_dmy(label: &str) -> Option<NaiveDate> {
    let caps = DATE_DMY.captures(label)?;
    let day: u32 = caps[1].parse().ok()?;
    let month: u32 = caps[2].parse().ok()?;
    let year = parse_year(&caps[3])?;

    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_year(s: &str) -> Option<i32> {
    let year: i32 = s.parse().ok()?;
    if s.len() == 2 {
        Some(2000 + year)
    } else {
        Some(year)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_dmy() {
        assert_eq!(parse_dmy("05/03/2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_dmy("5.3.2024"), NaiveDate::from_ymd_opt(2024, 3, 5));
        assert_eq!(parse_dmy("31-12-23"), NaiveDate::from_ymd_opt(2023, 12, 31));
    }

    #[test]
    fn test_parse_dmy_rejects() {
        assert_eq!(parse_dmy("N/A"), None);
        assert_eq!(parse_dmy("2024-03-05"), None);
        assert_eq!(parse_dmy("31/02/2024"), None);
        assert_eq!(parse_dmy("March 5, 2024"), None);
    }
}
