//! Shard identity: one file per (entity, month).
//!
//! Files are laid out as `<entity>/<YYYY>-<MM>.<ext>` relative to the
//! transport's base location. The month boundaries are calendar months in
//! UTC; a shard for month `M` holds rows with timestamps in
//! `[M.start(), M.end())`.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use snafu::prelude::*;

/// Errors parsing identity strings.
#[derive(Debug, Snafu, PartialEq, Eq)]
#[snafu(visibility(pub(crate)))]
pub enum ShardKeyError {
    /// Entity ids must be non-empty and must not contain `/`.
    #[snafu(display("Invalid entity id: {raw:?}"))]
    InvalidEntity {
        /// The rejected id.
        raw: String,
    },

    /// Month keys are `YYYY-MM`.
    #[snafu(display("Invalid month key {raw:?}: expected YYYY-MM"))]
    InvalidMonth {
        /// The rejected text.
        raw: String,
    },
}

/// Identifier of one data source (a device, a sensor, ...).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityId(String);

impl EntityId {
    /// Validate and wrap an entity id.
    pub fn new(raw: impl Into<String>) -> Result<Self, ShardKeyError> {
        let raw = raw.into();
        ensure!(
            !raw.is_empty() && !raw.contains('/'),
            InvalidEntitySnafu { raw }
        );
        Ok(Self(raw))
    }

    /// The id as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for EntityId {
    type Err = ShardKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// A calendar month in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MonthKey {
    year: i32,
    month: u32,
}

impl MonthKey {
    /// Construct from year and 1-based month.
    pub fn new(year: i32, month: u32) -> Option<Self> {
        (1..=12).contains(&month).then_some(Self { year, month })
    }

    /// Month containing `ts`.
    pub fn of(ts: DateTime<Utc>) -> Self {
        Self {
            year: ts.year(),
            month: ts.month(),
        }
    }

    /// Calendar year.
    pub fn year(&self) -> i32 {
        self.year
    }

    /// 1-based month.
    pub fn month(&self) -> u32 {
        self.month
    }

    /// Following month.
    pub fn next(&self) -> Self {
        if self.month == 12 {
            Self {
                year: self.year + 1,
                month: 1,
            }
        } else {
            Self {
                year: self.year,
                month: self.month + 1,
            }
        }
    }

    /// Preceding month.
    pub fn prev(&self) -> Self {
        if self.month == 1 {
            Self {
                year: self.year - 1,
                month: 12,
            }
        } else {
            Self {
                year: self.year,
                month: self.month - 1,
            }
        }
    }

    /// First instant of the month.
    pub fn start(&self) -> DateTime<Utc> {
        NaiveDate::from_ymd_opt(self.year, self.month, 1)
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|naive| Utc.from_utc_datetime(&naive))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    /// First instant of the following month.
    pub fn end(&self) -> DateTime<Utc> {
        self.next().start()
    }

    /// Months overlapping `[start, end)`, ascending.
    pub fn spanning(start: DateTime<Utc>, end: DateTime<Utc>) -> Vec<MonthKey> {
        if start >= end {
            return Vec::new();
        }
        let mut out = Vec::new();
        let mut m = MonthKey::of(start);
        while m.start() < end {
            out.push(m);
            m = m.next();
        }
        out
    }
}

impl fmt::Display for MonthKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}-{:02}", self.year, self.month)
    }
}

impl FromStr for MonthKey {
    type Err = ShardKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || ShardKeyError::InvalidMonth { raw: s.to_string() };
        let (y, m) = s.split_once('-').ok_or_else(invalid)?;
        if y.len() != 4 || m.len() != 2 {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month: u32 = m.parse().map_err(|_| invalid())?;
        MonthKey::new(year, month).ok_or_else(invalid)
    }
}

/// Identity of one shard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShardKey {
    /// Owning entity.
    pub entity: EntityId,
    /// Month the shard covers.
    pub month: MonthKey,
}

impl ShardKey {
    /// Construct a key.
    pub fn new(entity: EntityId, month: MonthKey) -> Self {
        Self { entity, month }
    }

    /// Object path relative to the base location: `<entity>/<YYYY>-<MM>.<ext>`.
    pub fn path(&self, extension: &str) -> String {
        format!("{}/{}.{}", self.entity, self.month, extension)
    }
}

impl fmt::Display for ShardKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.entity, self.month)
    }
}

/// Existence classification of a shard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShardState {
    /// Never probed.
    Unresolved,
    /// Exists remotely.
    Present,
    /// Returned 404; permanent for the session.
    Absent,
}

/// One monthly file and what is known about it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Shard {
    /// Identity.
    pub key: ShardKey,
    /// Object path relative to the transport base.
    pub url: String,
    /// Known file length, set once the shard has been probed.
    pub file_len: Option<u64>,
    /// Existence classification.
    pub state: ShardState,
}

impl Shard {
    /// An unresolved shard for `key`.
    pub fn new(key: ShardKey, extension: &str) -> Self {
        let url = key.path(extension);
        Self {
            key,
            url,
            file_len: None,
            state: ShardState::Unresolved,
        }
    }

    /// True once the shard has been classified (present or absent).
    pub fn is_resolved(&self) -> bool {
        self.state != ShardState::Unresolved
    }
}
