//! In-memory transport with a request log.
//!
//! Objects can be appended to (simulating a shard that grows while a
//! session is open), requests can be delayed, and failures can be injected
//! per object. Every request is recorded so tests can assert exactly which
//! network calls an operation issued.

use std::{
    collections::{HashMap, VecDeque},
    sync::{Arc, Mutex, MutexGuard},
    time::Duration,
};

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};

use super::{
    Probe, RangeBody, RangeResponse, RangeSpec, RangeTransport, TransportError, TransportResult,
};

/// Request method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// `HEAD`.
    Head,
    /// `GET` with a `Range` header.
    Get,
}

/// One recorded request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestRecord {
    /// Method used.
    pub method: Method,
    /// Object path.
    pub url: String,
    /// Range header, `None` for `HEAD`.
    pub range: Option<RangeSpec>,
}

#[derive(Debug, Default)]
struct MemoryState {
    objects: HashMap<String, Bytes>,
    log: Vec<RequestRecord>,
    failures: HashMap<String, VecDeque<u16>>,
    latency: Duration,
}

/// Transport over an in-memory object map. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryTransport {
    state: Arc<Mutex<MemoryState>>,
}

impl MemoryTransport {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, MemoryState> {
        // A panic while holding the lock leaves plain data behind; keep serving it.
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Create or replace an object.
    pub fn put(&self, url: impl Into<String>, data: impl Into<Bytes>) {
        self.lock().objects.insert(url.into(), data.into());
    }

    /// Append bytes to an object, creating it if needed.
    pub fn append(&self, url: &str, data: &[u8]) {
        let mut state = self.lock();
        let current = state.objects.remove(url).unwrap_or_default();
        let mut buf = BytesMut::with_capacity(current.len() + data.len());
        buf.extend_from_slice(&current);
        buf.extend_from_slice(data);
        state.objects.insert(url.to_string(), buf.freeze());
    }

    /// Delete an object.
    pub fn remove(&self, url: &str) {
        self.lock().objects.remove(url);
    }

    /// Current contents of an object.
    pub fn object(&self, url: &str) -> Option<Bytes> {
        self.lock().objects.get(url).cloned()
    }

    /// Fail the next `times` requests for `url` with HTTP `status`.
    pub fn fail_next(&self, url: &str, times: usize, status: u16) {
        let mut state = self.lock();
        let queue = state.failures.entry(url.to_string()).or_default();
        queue.extend(std::iter::repeat_n(status, times));
    }

    /// Delay every request by `latency` before it is served.
    pub fn set_latency(&self, latency: Duration) {
        self.lock().latency = latency;
    }

    /// All requests recorded so far.
    pub fn requests(&self) -> Vec<RequestRecord> {
        self.lock().log.clone()
    }

    /// Number of recorded requests with `method`.
    pub fn count(&self, method: Method) -> usize {
        self.lock().log.iter().filter(|r| r.method == method).count()
    }

    /// Total recorded requests.
    pub fn request_count(&self) -> usize {
        self.lock().log.len()
    }

    /// Forget recorded requests.
    pub fn clear_log(&self) {
        self.lock().log.clear();
    }

    /// Record the request and return the latency and an injected failure, if any.
    fn enter(&self, record: RequestRecord) -> (Duration, Option<TransportError>) {
        let mut state = self.lock();
        let url = record.url.clone();
        state.log.push(record);
        let failure = state
            .failures
            .get_mut(&url)
            .and_then(VecDeque::pop_front)
            .map(|status| TransportError::UnexpectedStatus { url, status });
        (state.latency, failure)
    }
}

#[async_trait]
impl RangeTransport for MemoryTransport {
    async fn head(&self, url: &str) -> TransportResult<Probe> {
        let (latency, failure) = self.enter(RequestRecord {
            method: Method::Head,
            url: url.to_string(),
            range: None,
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let len = self.object(url).map(|data| data.len() as u64);
        Ok(match len {
            Some(len) => Probe::Found { len },
            None => Probe::NotFound,
        })
    }

    async fn get(&self, url: &str, range: RangeSpec) -> TransportResult<RangeResponse> {
        let (latency, failure) = self.enter(RequestRecord {
            method: Method::Get,
            url: url.to_string(),
            range: Some(range),
        });
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if let Some(err) = failure {
            return Err(err);
        }

        let Some(object) = self.object(url) else {
            return Ok(RangeResponse::NotFound);
        };
        let total_len = object.len() as u64;
        let Some(span) = range.resolve(total_len) else {
            return Err(TransportError::RangeNotSatisfiable {
                url: url.to_string(),
                range: range.header_value(),
            });
        };

        Ok(RangeResponse::Found(RangeBody {
            offset: span.start,
            data: object.slice(span.start as usize..span.end as usize),
            total_len,
            partial: true,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    type TestResult = Result<(), Box<dyn std::error::Error>>;

    #[tokio::test]
    async fn append_grows_object_and_log_records_requests() -> TestResult {
        let t = MemoryTransport::new();
        t.put("a/2025-01.parquet", vec![1u8, 2, 3]);
        t.append("a/2025-01.parquet", &[4, 5]);

        assert_eq!(t.head("a/2025-01.parquet").await?, Probe::Found { len: 5 });
        let RangeResponse::Found(body) = t.get("a/2025-01.parquet", RangeSpec::FromOffset(3)).await? else {
            panic!("expected data");
        };
        assert_eq!(body.data.as_ref(), &[4u8, 5]);

        assert_eq!(t.count(Method::Head), 1);
        assert_eq!(t.count(Method::Get), 1);
        assert_eq!(t.requests()[1].range, Some(RangeSpec::FromOffset(3)));
        Ok(())
    }

    #[tokio::test]
    async fn injected_failures_are_consumed_in_order() -> TestResult {
        let t = MemoryTransport::new();
        t.put("x", vec![0u8; 10]);
        t.fail_next("x", 2, 503);

        assert!(t.get("x", RangeSpec::Suffix(4)).await.is_err());
        assert!(t.head("x").await.is_err());
        assert!(matches!(t.get("x", RangeSpec::Suffix(4)).await?, RangeResponse::Found(_)));
        assert_eq!(t.get("y", RangeSpec::Suffix(4)).await?, RangeResponse::NotFound);
        Ok(())
    }
}
