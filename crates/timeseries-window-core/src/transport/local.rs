//! Directory-backed transport with HTTP range semantics.
//!
//! Every `GET` behaves like a `206` from a range-capable server: the
//! requested span is clamped to the file, and a span starting at or past EOF
//! is reported as [`TransportError::RangeNotSatisfiable`].

use std::{
    io::{self, SeekFrom},
    path::{Path, PathBuf},
};

use async_trait::async_trait;
use bytes::Bytes;
use snafu::prelude::*;
use tokio::{
    fs,
    io::{AsyncReadExt, AsyncSeekExt},
};

use super::{
    IoSnafu, Probe, RangeBody, RangeNotSatisfiableSnafu, RangeResponse, RangeSpec, RangeTransport,
    TransportResult,
};

/// Transport reading shards from a local directory.
#[derive(Debug, Clone)]
pub struct LocalTransport {
    root: PathBuf,
}

impl LocalTransport {
    /// Serve objects below `root`.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory objects are resolved against.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, rel: &str) -> PathBuf {
        self.root.join(rel.trim_start_matches('/'))
    }

    /// `Ok(None)` for a missing path or a non-file.
    async fn file_len(&self, abs: &Path) -> TransportResult<Option<u64>> {
        match fs::metadata(abs).await {
            Ok(meta) if meta.is_file() => Ok(Some(meta.len())),
            Ok(_) => Ok(None),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e).context(IoSnafu {
                path: abs.display().to_string(),
            }),
        }
    }
}

#[async_trait]
impl RangeTransport for LocalTransport {
    async fn head(&self, rel: &str) -> TransportResult<Probe> {
        let abs = self.path_for(rel);
        Ok(match self.file_len(&abs).await? {
            Some(len) => Probe::Found { len },
            None => Probe::NotFound,
        })
    }

    async fn get(&self, rel: &str, range: RangeSpec) -> TransportResult<RangeResponse> {
        let abs = self.path_for(rel);
        let path_str = abs.display().to_string();

        let Some(total_len) = self.file_len(&abs).await? else {
            return Ok(RangeResponse::NotFound);
        };
        let span = range.resolve(total_len).context(RangeNotSatisfiableSnafu {
            url: path_str.clone(),
            range: range.header_value(),
        })?;

        let mut file = fs::File::open(&abs).await.context(IoSnafu {
            path: path_str.clone(),
        })?;
        file.seek(SeekFrom::Start(span.start))
            .await
            .context(IoSnafu {
                path: path_str.clone(),
            })?;
        let mut buf = vec![0u8; span.len() as usize];
        file.read_exact(&mut buf)
            .await
            .context(IoSnafu { path: path_str })?;

        Ok(RangeResponse::Found(RangeBody {
            offset: span.start,
            data: Bytes::from(buf),
            total_len,
            partial: true,
        }))
    }
}
