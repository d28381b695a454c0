use anyhow::{Result, anyhow};
use chrono::{NaiveDate, NaiveDateTime};

/// Tried in order; the first layout that parses wins, so US month-first layouts take
/// precedence over day-first ones for ambiguous inputs.
const DATE_FORMATS: &[&str] = &[
    "%Y-%m-%d", "%m/%d/%Y", "%d/%m/%Y", "%Y/%m/%d", "%m-%d-%Y", "%d-%m-%Y", "%Y.%m.%d",
    "%d.%m.%Y", "%Y%m%d", "%d%m%Y", "%m%d%Y",
];

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%m/%d/%Y %H:%M:%S",
    "%d/%m/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
    "%d/%m/%Y %H:%M",
];

pub fn parse_naive_date(value: &str) -> Result<NaiveDate> {
    let trimmed = value.trim();
    for fmt in DATE_FORMATS {
        if let Ok(parsed) = NaiveDate::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    if let Ok(parsed) = parse_naive_datetime(trimmed) {
        return Ok(parsed.date());
    }
    Err(anyhow!("no known date layout matches '{value}'"))
}

pub fn parse_naive_datetime(value: &str) -> Result<NaiveDateTime> {
    let trimmed = value.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(parsed) = NaiveDateTime::parse_from_str(trimmed, fmt) {
            return Ok(parsed);
        }
    }
    Err(anyhow!("no known datetime layout matches '{value}'"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn us_layout_wins_for_ambiguous_slashes() {
        let parsed = parse_naive_date("03/04/2021").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2021, 3, 4).unwrap());
    }

    #[test]
    fn day_first_used_when_month_is_impossible() {
        let parsed = parse_naive_date("25/04/2021").unwrap();
        assert_eq!(parsed, NaiveDate::from_ymd_opt(2021, 4, 25).unwrap());
    }

    #[test]
    fn dotted_and_compact_layouts_parse() {
        let expected = NaiveDate::from_ymd_opt(2021, 3, 4).unwrap();
        assert_eq!(parse_naive_date("2021.03.04").unwrap(), expected);
        assert_eq!(parse_naive_date("20210304").unwrap(), expected);
    }

    #[test]
    fn datetime_input_yields_its_date() {
        let expected = NaiveDate::from_ymd_opt(2024, 5, 6).unwrap();
        assert_eq!(parse_naive_date("2024-05-06 14:30:00").unwrap(), expected);
    }

    #[test]
    fn garbage_is_rejected() {
        assert!(parse_naive_date("not-a-date").is_err());
        assert!(parse_naive_datetime("2024-05-06").is_err());
    }
}
