//! Compact text encoding of a [`TimeWindow`]:
//!
//! ```text
//! [YYMMDD[THH[MM[SS]]]][-<n>d<n>h<n>m]
//! ```
//!
//! - No text at all is Latest mode with a one-day duration.
//! - `-3d` is Latest mode with a three-day duration.
//! - `251123` ends at 2025-11-23 00:00 UTC with a one-day duration.
//! - `251123T0432-2h30m` ends at 04:32 with a 150-minute duration.
//!
//! Trailing zero time fields and zero duration components are omitted, and a
//! one-day duration is never written. Timestamps are UTC with second
//! precision; durations are whole minutes. [`TimeWindow`] construction keeps
//! every window within those limits, so `decode(encode(w)) == w` always.

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};
use snafu::prelude::*;

use super::{DEFAULT_DURATION, MAX_DURATION, TimeWindow};

/// Errors decoding a compact window or a flexible datetime.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ParseWindowError {
    /// The timestamp part is not `YYMMDD[THH[MM[SS]]]`.
    #[snafu(display("Invalid window timestamp {input:?}"))]
    BadTimestamp {
        /// Offending text.
        input: String,
    },

    /// The duration part is not a sequence of `<n>d`, `<n>h`, `<n>m`.
    #[snafu(display("Invalid window duration {input:?}: expected e.g. 3d, 2h30m, 45m"))]
    BadDuration {
        /// Offending text.
        input: String,
    },

    /// Durations must be positive.
    #[snafu(display("Window duration must be positive"))]
    ZeroDuration,

    /// Durations are capped at one hundred years.
    #[snafu(display("Window duration {input:?} exceeds 36525d"))]
    DurationTooLong {
        /// Offending text.
        input: String,
    },

    /// A date or time in flexible form could not be parsed.
    #[snafu(display(
        "Invalid date/time {input:?}: expected e.g. 20250630, 250630T16, 20250630T16:20"
    ))]
    BadDateTime {
        /// Offending text.
        input: String,
    },
}

impl TimeWindow {
    /// Compact text form, or `None` for the default window (Latest, one day).
    pub fn encode(&self) -> Option<String> {
        let mut out = String::new();
        if let Some(end) = self.end {
            out.push_str(&encode_timestamp(end));
        }
        if self.duration != DEFAULT_DURATION {
            out.push('-');
            out.push_str(&encode_duration(self.duration));
        }
        (!out.is_empty()).then_some(out)
    }

    /// Parse the compact text form. `None` or empty text is the default window.
    pub fn decode(text: Option<&str>) -> Result<Self, ParseWindowError> {
        let text = text.map(str::trim).unwrap_or_default();
        let (ts, dur) = match text.split_once('-') {
            Some((ts, dur)) => (ts, Some(dur)),
            None => (text, None),
        };

        let end = if ts.is_empty() {
            None
        } else {
            Some(decode_timestamp(ts)?)
        };
        let duration = match dur {
            Some(d) => decode_duration(d)?,
            None => DEFAULT_DURATION,
        };
        Ok(TimeWindow { end, duration })
    }
}

impl FromStr for TimeWindow {
    type Err = ParseWindowError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        TimeWindow::decode(Some(s))
    }
}

fn encode_timestamp(ts: DateTime<Utc>) -> String {
    let mut out = format!("{:02}{:02}{:02}", ts.year().rem_euclid(100), ts.month(), ts.day());
    let (h, m, s) = (ts.hour(), ts.minute(), ts.second());
    if (h, m, s) != (0, 0, 0) {
        out.push_str(&format!("T{h:02}"));
        if (m, s) != (0, 0) {
            out.push_str(&format!("{m:02}"));
            if s != 0 {
                out.push_str(&format!("{s:02}"));
            }
        }
    }
    out
}

fn encode_duration(d: Duration) -> String {
    let total = d.num_minutes();
    let (days, rem) = (total / (24 * 60), total % (24 * 60));
    let (hours, minutes) = (rem / 60, rem % 60);

    let mut out = String::new();
    for (n, unit) in [(days, 'd'), (hours, 'h'), (minutes, 'm')] {
        if n != 0 {
            out.push_str(&format!("{n}{unit}"));
        }
    }
    out
}

fn two_digits(s: &str) -> Option<u32> {
    (s.len() == 2 && s.bytes().all(|b| b.is_ascii_digit()))
        .then(|| s.parse().ok())
        .flatten()
}

fn decode_timestamp(text: &str) -> Result<DateTime<Utc>, ParseWindowError> {
    let bad = || ParseWindowError::BadTimestamp {
        input: text.to_string(),
    };
    let (date, time) = match text.split_once('T') {
        Some((d, t)) => (d, Some(t)),
        None => (text, None),
    };
    if date.len() != 6
        || !date.bytes().all(|b| b.is_ascii_digit())
        || time.is_some_and(|t| !matches!(t.len(), 2 | 4 | 6))
    {
        return Err(bad());
    }

    let yy = two_digits(&date[0..2]).ok_or_else(bad)?;
    let mo = two_digits(&date[2..4]).ok_or_else(bad)?;
    let dd = two_digits(&date[4..6]).ok_or_else(bad)?;
    let date = NaiveDate::from_ymd_opt(2000 + yy as i32, mo, dd).ok_or_else(bad)?;

    let mut hms = [0u32; 3];
    if let Some(t) = time {
        for (i, chunk) in t.as_bytes().chunks(2).enumerate() {
            let part = std::str::from_utf8(chunk).map_err(|_| bad())?;
            hms[i] = two_digits(part).ok_or_else(bad)?;
        }
    }
    let time = NaiveTime::from_hms_opt(hms[0], hms[1], hms[2]).ok_or_else(bad)?;
    Ok(NaiveDateTime::new(date, time).and_utc())
}

fn decode_duration(text: &str) -> Result<Duration, ParseWindowError> {
    let bad = || ParseWindowError::BadDuration {
        input: text.to_string(),
    };
    ensure!(!text.is_empty(), BadDurationSnafu { input: text });

    let mut minutes: i64 = 0;
    let mut digits = String::new();
    // Units must appear at most once each, in d, h, m order.
    let mut next_unit = 0usize;
    for c in text.chars() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        let (rank, scale) = match c {
            'd' => (1, 24 * 60),
            'h' => (2, 60),
            'm' => (3, 1),
            _ => return Err(bad()),
        };
        if rank <= next_unit || digits.is_empty() {
            return Err(bad());
        }
        next_unit = rank;
        let n: i64 = digits.parse().map_err(|_| bad())?;
        digits.clear();
        minutes = n
            .checked_mul(scale)
            .and_then(|v| minutes.checked_add(v))
            .ok_or_else(bad)?;
    }
    ensure!(digits.is_empty(), BadDurationSnafu { input: text });
    ensure!(minutes > 0, ZeroDurationSnafu);
    ensure!(
        minutes <= MAX_DURATION.num_minutes(),
        DurationTooLongSnafu { input: text }
    );
    Duration::try_minutes(minutes).ok_or_else(bad)
}
