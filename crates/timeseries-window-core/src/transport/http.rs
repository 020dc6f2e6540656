//! `reqwest`-backed transport for `http(s)://` bases.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{CONTENT_LENGTH, CONTENT_RANGE, RANGE},
};
use snafu::prelude::*;

use super::{
    BadContentRangeSnafu, ContentRange, HttpSnafu, MissingLengthSnafu, Probe, RangeBody,
    RangeResponse, RangeSpec, RangeTransport, TransportError, TransportResult,
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP range transport rooted at a base URL.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base: String,
}

impl HttpTransport {
    /// Build a transport for `base` (for example `https://bucket.example.com/data`).
    pub fn new(base: impl Into<String>) -> TransportResult<Self> {
        let base = base.into();
        let client = Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .context(HttpSnafu { url: base.clone() })?;
        Ok(Self::with_client(client, base))
    }

    /// Use an existing client.
    pub fn with_client(client: Client, base: impl Into<String>) -> Self {
        Self {
            client,
            base: base.into(),
        }
    }

    /// Absolute URL for an object path.
    pub fn url_for(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }
}

fn header_str(resp: &reqwest::Response, name: reqwest::header::HeaderName) -> Option<String> {
    resp.headers()
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

#[async_trait]
impl RangeTransport for HttpTransport {
    async fn head(&self, path: &str) -> TransportResult<Probe> {
        let url = self.url_for(path);
        tracing::debug!(%url, "HEAD");
        let resp = self
            .client
            .head(&url)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(Probe::NotFound),
            s if s.is_success() => {
                let len = header_str(&resp, CONTENT_LENGTH)
                    .and_then(|v| v.trim().parse::<u64>().ok())
                    .context(MissingLengthSnafu { url })?;
                Ok(Probe::Found { len })
            }
            s => Err(TransportError::UnexpectedStatus {
                url,
                status: s.as_u16(),
            }),
        }
    }

    async fn get(&self, path: &str, range: RangeSpec) -> TransportResult<RangeResponse> {
        let url = self.url_for(path);
        let header = range.header_value();
        tracing::debug!(%url, range = %header, "GET");

        let resp = self
            .client
            .get(&url)
            .header(RANGE, &header)
            .send()
            .await
            .context(HttpSnafu { url: url.clone() })?;

        match resp.status() {
            StatusCode::NOT_FOUND => Ok(RangeResponse::NotFound),
            StatusCode::RANGE_NOT_SATISFIABLE => Err(TransportError::RangeNotSatisfiable {
                url,
                range: header,
            }),
            StatusCode::PARTIAL_CONTENT => {
                let value = header_str(&resp, CONTENT_RANGE);
                let parsed = value.as_deref().and_then(ContentRange::parse);
                let (Some(cr), Some(total)) = (parsed, parsed.and_then(|c| c.total)) else {
                    return BadContentRangeSnafu { url, value }.fail();
                };
                let data = resp.bytes().await.context(HttpSnafu { url: url.clone() })?;
                ensure!(
                    data.len() as u64 == cr.range.len(),
                    BadContentRangeSnafu {
                        url,
                        value: value.map(|v| format!("{v} (body {} bytes)", data.len())),
                    }
                );
                Ok(RangeResponse::Found(RangeBody {
                    offset: cr.range.start,
                    data,
                    total_len: total,
                    partial: true,
                }))
            }
            s if s.is_success() => {
                let data = resp.bytes().await.context(HttpSnafu { url: url.clone() })?;
                Ok(RangeResponse::Found(RangeBody {
                    offset: 0,
                    total_len: data.len() as u64,
                    data,
                    partial: false,
                }))
            }
            s => Err(TransportError::UnexpectedStatus {
                url,
                status: s.as_u16(),
            }),
        }
    }
}
