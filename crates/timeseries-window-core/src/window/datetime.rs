//! Lenient date/time input for command lines.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

use super::ParseWindowError;

/// Parse a date/time typed by a person. All forms are UTC.
///
/// Accepted:
///
/// - `20250630`, `250630` (two-digit years are 20xx)
/// - an optional time after `T`: `HH`, `HHMM`, `HH:MM`, `HHMMSS`, `HH:MM:SS`
///   (`250630T16`, `20250630T16:20`, ...)
/// - RFC 3339 (`2025-06-30T16:20:00Z`), or the same without an offset
pub fn parse_flexible_datetime(input: &str) -> Result<DateTime<Utc>, ParseWindowError> {
    let text = input.trim();
    let bad = || ParseWindowError::BadDateTime {
        input: input.to_string(),
    };

    if text.contains('-') {
        if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
            return Ok(dt.with_timezone(&Utc));
        }
        return NaiveDateTime::parse_from_str(text, "%Y-%m-%dT%H:%M:%S")
            .map(|naive| naive.and_utc())
            .map_err(|_| bad());
    }

    let (date, time) = match text.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };
    if !date.bytes().all(|b| b.is_ascii_digit()) {
        return Err(bad());
    }
    let full = match date.len() {
        8 => date.to_string(),
        6 => format!("20{date}"),
        _ => return Err(bad()),
    };
    let num = |range: std::ops::Range<usize>| full[range].parse::<u32>().ok();
    let date = match (num(0..4), num(4..6), num(6..8)) {
        (Some(y), Some(m), Some(d)) => NaiveDate::from_ymd_opt(y as i32, m, d).ok_or_else(bad)?,
        _ => return Err(bad()),
    };

    let time = match time {
        None => NaiveTime::from_hms_opt(0, 0, 0).ok_or_else(bad)?,
        Some(t) => {
            let fmt = match (t.len(), t.matches(':').count()) {
                (2, 0) => "%H",
                (4, 0) => "%H%M",
                (5, 1) => "%H:%M",
                (6, 0) => "%H%M%S",
                (8, 2) => "%H:%M:%S",
                _ => return Err(bad()),
            };
            parse_time(t, fmt).ok_or_else(bad)?
        }
    };

    Ok(NaiveDateTime::new(date, time).and_utc())
}

fn parse_time(t: &str, fmt: &str) -> Option<NaiveTime> {
    // `%H` alone does not yield a full time in chrono; pad to HH:MM:SS.
    if fmt == "%H" {
        return NaiveTime::parse_from_str(&format!("{t}:00:00"), "%H:%M:%S").ok();
    }
    if fmt == "%H%M" || fmt == "%H:%M" {
        return NaiveTime::parse_from_str(&format!("{t}00"), &format!("{fmt}%S")).ok();
    }
    NaiveTime::parse_from_str(t, fmt).ok()
}
