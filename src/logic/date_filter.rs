//! Date query parameters for change log listings.
//!
//! Accepted forms: `2025-01-01` (that whole UTC day), `2025-01-01,2025-01-31`
//! (inclusive bounds), `>2025-01-01` and `<2025-01-01` (open ranges). Full
//! RFC 3339 timestamps are accepted anywhere a date is.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};

use crate::model::DateRange;

fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn whole_day(raw: &str) -> Option<DateRange> {
    let date = NaiveDate::parse_from_str(raw, "%Y-%m-%d").ok()?;
    let start = Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?);
    let end = Utc.from_utc_datetime(&date.and_hms_nano_opt(23, 59, 59, 999_999_999)?);
    Some(DateRange {
        gte: Some(start),
        lte: Some(end),
    })
}

/// Parse a date filter, returning a message suitable for a 400 on failure
pub fn parse_date_filter(raw: &str) -> Result<DateRange, String> {
    let value = raw.trim();
    let invalid = || "must be a valid date".to_string();

    if let Some(rest) = value.strip_prefix('>') {
        let gte = parse_instant(rest).ok_or_else(invalid)?;
        return Ok(DateRange {
            gte: Some(gte),
            lte: None,
        });
    }

    if let Some(rest) = value.strip_prefix('<') {
        let lte = parse_instant(rest).ok_or_else(invalid)?;
        return Ok(DateRange {
            gte: None,
            lte: Some(lte),
        });
    }

    if let Some((start, end)) = value.split_once(',') {
        let gte = parse_instant(start).ok_or_else(invalid)?;
        let lte = parse_instant(end).ok_or_else(invalid)?;
        if gte > lte {
            return Err("start date must be before end date".to_string());
        }
        return Ok(DateRange {
            gte: Some(gte),
            lte: Some(lte),
        });
    }

    if let Some(range) = whole_day(value) {
        return Ok(range);
    }

    let instant = parse_instant(value).ok_or_else(invalid)?;
    Ok(DateRange {
        gte: Some(instant),
        lte: Some(instant),
    })
}
