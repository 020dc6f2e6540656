//! Errors surfaced by [`ShardSession`](super::ShardSession).
//!
//! Absent shards and superseded navigation results are not errors; they are
//! reported through the normal return values.

use snafu::prelude::*;

use crate::{shard::ShardKey, transport::TransportError};

/// Failure to serve one shard. Other shards are unaffected.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SessionError {
    /// The shard's footer or layout is corrupt or unsupported.
    ///
    /// Remembered for the session: the shard is not fetched again.
    #[snafu(display("Shard {key} is unreadable: {reason}"))]
    Unreadable {
        /// Affected shard.
        key: ShardKey,
        /// Description of the format problem.
        reason: String,
    },

    /// Requests kept failing after retries. Cached bytes stay usable and a
    /// later call may succeed.
    #[snafu(display("Shard {key} is temporarily unavailable: {source}"))]
    Unavailable {
        /// Affected shard.
        key: ShardKey,
        /// Last transport error.
        source: TransportError,
    },
}

impl SessionError {
    /// Shard the error refers to.
    pub fn key(&self) -> &ShardKey {
        match self {
            SessionError::Unreadable { key, .. } | SessionError::Unavailable { key, .. } => key,
        }
    }

    /// True for errors that are permanent for the session.
    pub fn is_permanent(&self) -> bool {
        matches!(self, SessionError::Unreadable { .. })
    }
}

/// Result alias for session operations.
pub type SessionResult<T> = Result<T, SessionError>;
