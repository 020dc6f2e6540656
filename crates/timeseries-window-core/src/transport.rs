//! Byte-range transport over object storage.
//!
//! The engine talks to storage through [`RangeTransport`], which exposes the
//! two requests the fetch engine needs:
//!
//! - `HEAD` for existence and length probing (used by refresh only);
//! - `GET` with a `Range` header in one of three shapes ([`RangeSpec`]).
//!
//! A `404` is not an error at this layer: it is reported as
//! [`Probe::NotFound`] / [`RangeResponse::NotFound`] so callers can record
//! the shard as absent.
//!
//! Implementations:
//!
//! - [`HttpTransport`]: HTTP(S) via `reqwest`.
//! - [`LocalTransport`]: a directory on disk with the same range semantics.
//! - [`MemoryTransport`]: in-memory objects with a request log, used by tests.

use std::fmt;

use async_trait::async_trait;
use bytes::Bytes;
use snafu::{Backtrace, prelude::*};

use crate::interval::ByteRange;

pub mod http;
pub mod local;
pub mod memory;
pub mod retry;

pub use http::HttpTransport;
pub use local::LocalTransport;
pub use memory::{MemoryTransport, Method, RequestRecord};
pub use retry::with_retry;

/// Errors raised by transports.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum TransportError {
    /// The HTTP client failed before a status was received.
    #[snafu(display("HTTP request to {url} failed: {source}"))]
    Http {
        /// Request URL.
        url: String,
        /// Underlying client error.
        source: reqwest::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// A local file could not be read.
    #[snafu(display("I/O error reading {path}: {source}"))]
    Io {
        /// Local path.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
        /// Backtrace captured at the failure site.
        backtrace: Backtrace,
    },

    /// The server answered with a status the engine cannot use.
    #[snafu(display("Unexpected HTTP status {status} from {url}"))]
    UnexpectedStatus {
        /// Request URL.
        url: String,
        /// HTTP status code.
        status: u16,
    },

    /// A `206` response carried a missing or malformed `Content-Range`.
    #[snafu(display("Bad Content-Range from {url}: {value:?}"))]
    BadContentRange {
        /// Request URL.
        url: String,
        /// Raw header value, if any.
        value: Option<String>,
    },

    /// A probe succeeded but did not report the object length.
    #[snafu(display("Missing Content-Length in response from {url}"))]
    MissingLength {
        /// Request URL.
        url: String,
    },

    /// The requested range lies outside the object (`416`).
    #[snafu(display("Range {range} not satisfiable for {url}"))]
    RangeNotSatisfiable {
        /// Request URL.
        url: String,
        /// The `Range` header value that was sent.
        range: String,
    },
}

impl TransportError {
    /// True if repeating the request may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            TransportError::Http { source, .. } => {
                source.is_timeout() || source.is_connect() || source.is_request() || source.is_body()
            }
            TransportError::Io { source, .. } => matches!(
                source.kind(),
                std::io::ErrorKind::Interrupted | std::io::ErrorKind::TimedOut
            ),
            TransportError::UnexpectedStatus { status, .. } => {
                *status == 408 || *status == 429 || (500..600).contains(status)
            }
            TransportError::BadContentRange { .. }
            | TransportError::MissingLength { .. }
            | TransportError::RangeNotSatisfiable { .. } => false,
        }
    }
}

/// Result alias for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// Shape of a `Range` request header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RangeSpec {
    /// `bytes=start-end` with an inclusive end.
    Closed {
        /// First byte.
        start: u64,
        /// Last byte (inclusive).
        end_inclusive: u64,
    },
    /// `bytes=start-`: everything from `start` to the current end of file.
    FromOffset(u64),
    /// `bytes=-n`: the last `n` bytes.
    Suffix(u64),
}

impl RangeSpec {
    /// Closed request for a half-open byte range; `None` if the range is empty.
    pub fn closed(range: ByteRange) -> Option<Self> {
        range.last().map(|end_inclusive| RangeSpec::Closed {
            start: range.start,
            end_inclusive,
        })
    }

    /// Value for the `Range` header.
    pub fn header_value(&self) -> String {
        match *self {
            RangeSpec::Closed {
                start,
                end_inclusive,
            } => format!("bytes={start}-{end_inclusive}"),
            RangeSpec::FromOffset(start) => format!("bytes={start}-"),
            RangeSpec::Suffix(n) => format!("bytes=-{n}"),
        }
    }

    /// Bytes a server holding `total` bytes returns for this request.
    ///
    /// Follows RFC 9110: a closed end past EOF is clamped, a suffix longer
    /// than the object returns the whole object, and anything starting at
    /// or after EOF is unsatisfiable (`None`).
    pub fn resolve(&self, total: u64) -> Option<ByteRange> {
        match *self {
            RangeSpec::Closed {
                start,
                end_inclusive,
            } => (start < total && start <= end_inclusive)
                .then(|| ByteRange::new(start, end_inclusive.saturating_add(1).min(total))),
            RangeSpec::FromOffset(start) => (start < total).then(|| ByteRange::new(start, total)),
            RangeSpec::Suffix(n) => {
                (n > 0 && total > 0).then(|| ByteRange::new(total.saturating_sub(n), total))
            }
        }
    }
}

impl fmt::Display for RangeSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.header_value())
    }
}

/// Parsed `Content-Range: bytes a-b/total` header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContentRange {
    /// Bytes carried by the response.
    pub range: ByteRange,
    /// Object length, `None` for `*`.
    pub total: Option<u64>,
}

impl ContentRange {
    /// Parse a header value; `None` if malformed.
    pub fn parse(value: &str) -> Option<Self> {
        let rest = value.trim().strip_prefix("bytes")?.trim_start();
        let (span, total) = rest.split_once('/')?;
        let (a, b) = span.trim().split_once('-')?;
        let start: u64 = a.trim().parse().ok()?;
        let last: u64 = b.trim().parse().ok()?;
        if last < start {
            return None;
        }
        let total = match total.trim() {
            "*" => None,
            t => Some(t.parse::<u64>().ok()?),
        };
        if let Some(t) = total
            && last >= t
        {
            return None;
        }
        Some(Self {
            range: ByteRange::new(start, last + 1),
            total,
        })
    }
}

/// Result of a `HEAD` probe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Probe {
    /// Object exists with this length.
    Found {
        /// Object length in bytes.
        len: u64,
    },
    /// `404`.
    NotFound,
}

/// Bytes returned by a successful `GET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RangeBody {
    /// Absolute offset of the first byte in `data`.
    pub offset: u64,
    /// Payload.
    pub data: Bytes,
    /// Object length reported by the server.
    pub total_len: u64,
    /// `true` for `206`, `false` when the server sent the whole object (`200`).
    pub partial: bool,
}

impl RangeBody {
    /// Absolute byte span covered by `data`.
    pub fn range(&self) -> ByteRange {
        ByteRange::with_len(self.offset, self.data.len() as u64)
    }
}

/// Result of a ranged `GET`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RangeResponse {
    /// `200` or `206`.
    Found(RangeBody),
    /// `404`.
    NotFound,
}

/// Storage access used by the session.
#[async_trait]
pub trait RangeTransport: fmt::Debug + Send + Sync {
    /// Probe existence and length of `url`.
    async fn head(&self, url: &str) -> TransportResult<Probe>;

    /// Fetch `range` of `url`.
    async fn get(&self, url: &str, range: RangeSpec) -> TransportResult<RangeResponse>;
}
