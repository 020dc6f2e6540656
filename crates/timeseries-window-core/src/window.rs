//! Time windows and their compact text form.
//!
//! A [`TimeWindow`] is an end instant plus a duration. A missing end means
//! *Latest* mode: the window ends at the current wall-clock time, evaluated
//! each time the window is resolved, never at the timestamp of cached data.
//!
//! Windows are normalised on construction to what the compact form can
//! express, so every window survives an encode/decode round trip:
//!
//! - durations are whole minutes between [`MIN_DURATION`] and [`MAX_DURATION`];
//! - fixed ends are whole seconds between [`EARLIEST_END`] and [`LATEST_END`].

mod codec;
mod datetime;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike, Utc};

pub use codec::ParseWindowError;
pub use datetime::parse_flexible_datetime;

/// Duration used when none is given: one day.
pub const DEFAULT_DURATION: Duration = Duration::days(1);

/// Shortest window.
pub const MIN_DURATION: Duration = Duration::minutes(1);

/// Longest window: one hundred years.
pub const MAX_DURATION: Duration = Duration::days(36_525);

/// Earliest fixed end: 2000-01-01T00:00:00Z.
pub const EARLIEST_END: DateTime<Utc> = NaiveDateTime::new(
    match NaiveDate::from_ymd_opt(2000, 1, 1) {
        Some(d) => d,
        None => NaiveDate::MIN,
    },
    NaiveTime::MIN,
)
.and_utc();

/// Latest fixed end: 2099-12-31T23:59:59Z.
pub const LATEST_END: DateTime<Utc> = NaiveDateTime::new(
    match NaiveDate::from_ymd_opt(2099, 12, 31) {
        Some(d) => d,
        None => NaiveDate::MAX,
    },
    match NaiveTime::from_hms_opt(23, 59, 59) {
        Some(t) => t,
        None => NaiveTime::MIN,
    },
)
.and_utc();

/// A window of time ending at a fixed instant or at "now".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimeWindow {
    end: Option<DateTime<Utc>>,
    duration: Duration,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self::latest(DEFAULT_DURATION)
    }
}

/// Round to the nearest minute and clamp to the supported range.
fn normalize_duration(d: Duration) -> Duration {
    let ms = d.num_milliseconds();
    let minutes = ms.div_euclid(60_000) + i64::from(ms.rem_euclid(60_000) >= 30_000);
    Duration::minutes(minutes.clamp(MIN_DURATION.num_minutes(), MAX_DURATION.num_minutes()))
}

/// Drop sub-second precision and clamp to the supported range.
fn normalize_end(end: DateTime<Utc>) -> DateTime<Utc> {
    let end = end.with_nanosecond(0).unwrap_or(end);
    end.clamp(EARLIEST_END, LATEST_END)
}

impl TimeWindow {
    /// Window ending now.
    pub fn latest(duration: Duration) -> Self {
        Self {
            end: None,
            duration: normalize_duration(duration),
        }
    }

    /// Window ending at `end`.
    pub fn fixed(end: DateTime<Utc>, duration: Duration) -> Self {
        Self {
            end: Some(normalize_end(end)),
            duration: normalize_duration(duration),
        }
    }

    /// Fixed end, or `None` in Latest mode.
    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.end
    }

    /// Window length.
    pub fn duration(&self) -> Duration {
        self.duration
    }

    /// True in Latest mode.
    pub fn is_latest(&self) -> bool {
        self.end.is_none()
    }

    /// Absolute `[start, end)` at wall-clock time `now`.
    pub fn resolve(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        let end = self.end.unwrap_or(now);
        let start = end.checked_sub_signed(self.duration).unwrap_or(DateTime::<Utc>::MIN_UTC);
        (start, end)
    }

    /// Same duration, ending at `end`.
    pub fn ending_at(&self, end: DateTime<Utc>) -> Self {
        Self::fixed(end, self.duration)
    }

    /// Same end (or Latest mode), with a new duration.
    pub fn with_duration(&self, duration: Duration) -> Self {
        Self {
            end: self.end,
            duration: normalize_duration(duration),
        }
    }
}
