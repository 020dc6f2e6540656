//! Footer location and decoding for Parquet shards.
//!
//! A shard ends with:
//!
//! ```text
//! [ ... row groups ... ][ metadata blob ][ 4-byte LE metadata length ][ "PAR1" ]
//! ```
//!
//! The footer therefore starts at `file_len - metadata_len - 8`. Callers
//! usually hold only the *tail* of the file (a suffix fetch), so every
//! function here takes the tail buffer plus the total file length and works
//! out absolute offsets from those two values.
//!
//! Decoding the metadata blob is delegated to `parquet`; this module turns
//! the result into [`RowGroupDescriptor`]s (byte span, row span, time span).

use bytes::Bytes;
use chrono::{DateTime, TimeZone, Utc};
use parquet::{
    basic::{LogicalType, TimeUnit, Type as PhysicalType},
    errors::ParquetError,
    file::metadata::{ParquetMetaData, ParquetMetaDataReader, RowGroupMetaData},
};
use snafu::{Backtrace, prelude::*};

use crate::{
    interval::ByteRange,
    row_group::{RowGroupDescriptor, TimeSpan},
};

/// Magic bytes closing every Parquet file.
pub const PARQUET_MAGIC: [u8; 4] = *b"PAR1";

/// Length of the fixed trailer: 4-byte metadata length + 4-byte magic.
pub const FOOTER_TRAILER_LEN: u64 = 8;

/// Format errors raised while locating or decoding a footer.
///
/// Any of these makes the shard unreadable; other shards are unaffected.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum FooterError {
    /// The tail buffer cannot hold the fixed trailer.
    #[snafu(display("Tail buffer too short for footer trailer: {len} bytes (need 8)"))]
    TooShort {
        /// Length of the buffer that was supplied.
        len: usize,
    },

    /// The last four bytes are not the Parquet magic.
    #[snafu(display("Bad footer magic: expected PAR1, found {found:?}"))]
    BadMagic {
        /// The trailing four bytes that were found instead.
        found: [u8; 4],
    },

    /// The declared metadata length does not fit inside the file.
    #[snafu(display(
        "Footer metadata length {metadata_len} implies a negative start in a {file_len}-byte file"
    ))]
    NegativeFooterStart {
        /// Declared metadata length from the trailer.
        metadata_len: u64,
        /// Total file length.
        file_len: u64,
    },

    /// The tail buffer starts after the footer does; more bytes are required.
    #[snafu(display(
        "Footer starts at {footer_start} but the tail buffer only begins at {available_start}"
    ))]
    Truncated {
        /// Absolute offset where the footer begins.
        footer_start: u64,
        /// Absolute offset of the first byte in the tail buffer.
        available_start: u64,
    },

    /// The metadata blob could not be decoded.
    #[snafu(display("Failed to decode footer metadata: {source}"))]
    Decode {
        /// Underlying Parquet decoding error.
        source: ParquetError,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// The designated time column is not part of the schema.
    #[snafu(display("Time column {column} not found in footer schema"))]
    MissingTimeColumn {
        /// Configured time column name.
        column: String,
    },

    /// The time column is not an INT64 timestamp.
    #[snafu(display(
        "Unsupported type for time column {column}: physical={physical} logical={logical}"
    ))]
    UnsupportedTimeColumn {
        /// Configured time column name.
        column: String,
        /// Parquet physical type.
        physical: String,
        /// Parquet logical type annotation, if any.
        logical: String,
    },

    /// Time statistics exist but are not 8-byte little-endian integers.
    #[snafu(display("Malformed statistics for time column {column}: {detail}"))]
    StatsShape {
        /// Configured time column name.
        column: String,
        /// Description of the problem.
        detail: String,
    },

    /// Column offsets or row-group ordering violate the expected layout.
    #[snafu(display("Unsupported row-group layout: {detail}"))]
    InvalidLayout {
        /// Description of the violated invariant.
        detail: String,
    },
}

/// Result alias for footer operations.
pub type FooterResult<T> = Result<T, FooterError>;

/// Position of the footer inside a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FooterLocation {
    /// Declared length of the metadata blob.
    pub metadata_len: u64,
    /// Absolute offset where the metadata blob begins.
    pub footer_start: u64,
    /// Total file length the location was computed against.
    pub file_len: u64,
}

impl FooterLocation {
    /// Byte span of metadata blob plus trailer, up to end of file.
    pub fn span(&self) -> ByteRange {
        ByteRange::new(self.footer_start, self.file_len)
    }

    /// Footer length including the 8-byte trailer.
    pub fn footer_len(&self) -> u64 {
        self.metadata_len + FOOTER_TRAILER_LEN
    }
}

/// Decoded footer of one shard.
#[derive(Debug, Clone, PartialEq)]
pub struct FooterMetadata {
    /// Total rows across all row groups.
    pub total_rows: u64,
    /// Row groups in file order.
    pub row_groups: Vec<RowGroupDescriptor>,
    /// Footer length including the 8-byte trailer.
    pub footer_len: u64,
    /// File length at parse time.
    pub file_len: u64,
}

impl FooterMetadata {
    /// Byte span of the footer (metadata blob + trailer).
    pub fn footer_span(&self) -> ByteRange {
        ByteRange::new(self.file_len - self.footer_len, self.file_len)
    }

    /// Summary of the shard derived from the footer alone.
    pub fn summary(&self) -> ShardSummary {
        let earliest = self
            .row_groups
            .iter()
            .filter_map(|rg| rg.time)
            .map(|t| t.min)
            .min();
        let latest = self
            .row_groups
            .iter()
            .filter_map(|rg| rg.time)
            .map(|t| t.max)
            .max();

        ShardSummary {
            row_count: self.total_rows,
            earliest,
            latest,
            file_len: self.file_len,
            row_groups: self.row_groups.len(),
        }
    }
}

/// Footer-only description of a shard's contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShardSummary {
    /// Number of rows.
    pub row_count: u64,
    /// Earliest timestamp covered by statistics, if any.
    pub earliest: Option<DateTime<Utc>>,
    /// Latest timestamp covered by statistics, if any.
    pub latest: Option<DateTime<Utc>>,
    /// File length in bytes.
    pub file_len: u64,
    /// Number of row groups.
    pub row_groups: usize,
}

/// Find the footer from the trailing bytes of a file.
///
/// `tail` must be the last `tail.len()` bytes of a `file_len`-byte file.
pub fn locate_footer(tail: &[u8], file_len: u64) -> FooterResult<FooterLocation> {
    let len = tail.len();
    ensure!(len >= FOOTER_TRAILER_LEN as usize, TooShortSnafu { len });

    let trailer = &tail[len - FOOTER_TRAILER_LEN as usize..];
    let mut found = [0u8; 4];
    found.copy_from_slice(&trailer[4..8]);
    ensure!(found == PARQUET_MAGIC, BadMagicSnafu { found });

    let metadata_len =
        u32::from_le_bytes([trailer[0], trailer[1], trailer[2], trailer[3]]) as u64;
    let footer_start = file_len
        .checked_sub(metadata_len + FOOTER_TRAILER_LEN)
        .context(NegativeFooterStartSnafu {
            metadata_len,
            file_len,
        })?;

    Ok(FooterLocation {
        metadata_len,
        footer_start,
        file_len,
    })
}

/// Decode the footer held in `tail` into row-group descriptors.
///
/// Returns [`FooterError::Truncated`] when `tail` does not reach back to the
/// start of the metadata blob; callers fetch the missing prefix and retry.
pub fn parse_footer(tail: &Bytes, file_len: u64, time_column: &str) -> FooterResult<FooterMetadata> {
    let location = locate_footer(tail, file_len)?;
    let available_start = file_len.saturating_sub(tail.len() as u64);
    ensure!(
        location.footer_start >= available_start,
        TruncatedSnafu {
            footer_start: location.footer_start,
            available_start,
        }
    );

    let lo = (location.footer_start - available_start) as usize;
    let footer_bytes = tail.slice(lo..);
    let meta = ParquetMetaDataReader::new()
        .parse_and_finish(&footer_bytes)
        .context(DecodeSnafu)?;

    let row_groups = describe_row_groups(&meta, location.footer_start, time_column)?;
    let total_rows = row_groups.last().map(|rg| rg.row_end).unwrap_or(0);

    Ok(FooterMetadata {
        total_rows,
        row_groups,
        footer_len: location.footer_len(),
        file_len,
    })
}

/// Which timestamp unit the time column is stored in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TimestampUnit {
    Millis,
    Micros,
    Nanos,
}

fn timestamp_unit(
    column: &str,
    physical: PhysicalType,
    logical: Option<&LogicalType>,
) -> FooterResult<TimestampUnit> {
    let unsupported = || FooterError::UnsupportedTimeColumn {
        column: column.to_string(),
        physical: format!("{physical:?}"),
        logical: format!("{logical:?}"),
    };

    if physical != PhysicalType::INT64 {
        return Err(unsupported());
    }

    match logical {
        Some(LogicalType::Timestamp { unit, .. }) => match unit {
            TimeUnit::MILLIS => Ok(TimestampUnit::Millis),
            TimeUnit::MICROS => Ok(TimestampUnit::Micros),
            TimeUnit::NANOS => Ok(TimestampUnit::Nanos),
        },
        _ => Err(unsupported()),
    }
}

fn stat_to_datetime(column: &str, unit: TimestampUnit, bytes: &[u8]) -> FooterResult<DateTime<Utc>> {
    let raw: [u8; 8] = bytes.try_into().map_err(|_| FooterError::StatsShape {
        column: column.to_string(),
        detail: format!("statistic is {} bytes, expected 8", bytes.len()),
    })?;
    let value = i64::from_le_bytes(raw);

    let dt = match unit {
        TimestampUnit::Millis => Utc.timestamp_millis_opt(value),
        TimestampUnit::Micros => Utc.timestamp_micros(value),
        TimestampUnit::Nanos => {
            let secs = value.div_euclid(1_000_000_000);
            let nanos = value.rem_euclid(1_000_000_000) as u32;
            Utc.timestamp_opt(secs, nanos)
        }
    };

    dt.single().ok_or_else(|| FooterError::StatsShape {
        column: column.to_string(),
        detail: format!("timestamp {value} out of range"),
    })
}

fn column_offset(value: i64, what: &str, rg: usize, col: usize) -> FooterResult<u64> {
    u64::try_from(value).map_err(|_| FooterError::InvalidLayout {
        detail: format!("row group {rg} column {col} has negative {what} ({value})"),
    })
}

fn byte_span(rg: &RowGroupMetaData, index: usize) -> FooterResult<ByteRange> {
    let mut span: Option<ByteRange> = None;

    for (col_idx, col) in rg.columns().iter().enumerate() {
        let start = col.dictionary_page_offset().unwrap_or(col.data_page_offset());
        let start = column_offset(start, "page offset", index, col_idx)?;
        let size = column_offset(col.compressed_size(), "compressed size", index, col_idx)?;
        let col_span = ByteRange::with_len(start, size);
        span = Some(match span {
            Some(prev) => prev.hull(&col_span),
            None => col_span,
        });
    }

    span.ok_or_else(|| FooterError::InvalidLayout {
        detail: format!("row group {index} has no columns"),
    })
}

fn time_span(
    rg: &RowGroupMetaData,
    time_idx: usize,
    column: &str,
    unit: TimestampUnit,
) -> FooterResult<Option<TimeSpan>> {
    let Some(stats) = rg.column(time_idx).statistics() else {
        return Ok(None);
    };
    let (Some(min), Some(max)) = (stats.min_bytes_opt(), stats.max_bytes_opt()) else {
        return Ok(None);
    };

    Ok(Some(TimeSpan {
        min: stat_to_datetime(column, unit, min)?,
        max: stat_to_datetime(column, unit, max)?,
    }))
}

fn describe_row_groups(
    meta: &ParquetMetaData,
    footer_start: u64,
    time_column: &str,
) -> FooterResult<Vec<RowGroupDescriptor>> {
    let schema = meta.file_metadata().schema_descr();
    let time_idx = schema
        .columns()
        .iter()
        .position(|c| c.name() == time_column)
        .context(MissingTimeColumnSnafu {
            column: time_column.to_string(),
        })?;
    let time_desc = schema.column(time_idx);
    let unit = timestamp_unit(
        time_column,
        time_desc.physical_type(),
        time_desc.logical_type_ref(),
    )?;

    let mut out = Vec::with_capacity(meta.num_row_groups());
    let mut row_start = 0u64;

    for (index, rg) in meta.row_groups().iter().enumerate() {
        let rows = u64::try_from(rg.num_rows()).map_err(|_| FooterError::InvalidLayout {
            detail: format!("row group {index} has negative row count"),
        })?;
        let bytes = byte_span(rg, index)?;
        ensure!(
            bytes.end <= footer_start,
            InvalidLayoutSnafu {
                detail: format!("row group {index} span {bytes} overlaps the footer at {footer_start}"),
            }
        );

        out.push(RowGroupDescriptor {
            index,
            row_start,
            row_end: row_start + rows,
            bytes,
            time: time_span(rg, time_idx, time_column, unit)?,
        });
        row_start += rows;
    }

    Ok(out)
}
