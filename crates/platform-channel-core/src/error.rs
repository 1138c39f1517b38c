//! Error types for channel traffic.

use crate::PlatformError;

/// Failure to turn bytes into a call or an envelope.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unexpected envelope: {0}")]
    InvalidEnvelope(String),
    #[error("empty message where a payload was required")]
    Empty,
}

/// Failure to read a [`Parcel`](crate::Parcel).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParcelError {
    #[error("parcel truncated: needed {needed} bytes at offset {offset}, {available} available")]
    Truncated {
        offset: usize,
        needed: usize,
        available: usize,
    },
    #[error("invalid string length {0}")]
    InvalidLength(i32),
    #[error("string is not valid UTF-8")]
    InvalidUtf8,
    #[error("string of {0} bytes does not fit a parcel length")]
    TooLong(usize),
}

/// Outcome of a channel operation that did not produce a handler answer.
///
/// [`ChannelError::NoHandlerBound`] is a transport condition and is never
/// confused with a handler that answered "not implemented".
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("no handler bound for channel {channel}")]
    NoHandlerBound { channel: String },
    #[error("handler on {channel} dropped its reply")]
    ReplyDropped { channel: String },
    #[error("call on {channel} timed out")]
    Timeout { channel: String },
    #[error("transport closed")]
    TransportClosed,
    #[error("{channel}: {error}")]
    Platform {
        channel: String,
        error: PlatformError,
    },
    #[error("method {method} not implemented on {channel}")]
    NotImplemented { channel: String, method: String },
    #[error(transparent)]
    Codec(#[from] CodecError),
}

impl ChannelError {
    /// Stable code reported to callers for transport-level failures.
    pub fn code(&self) -> &str {
        match self {
            Self::NoHandlerBound { .. } => "no-handler",
            Self::ReplyDropped { .. } => "reply-dropped",
            Self::Timeout { .. } => "timeout",
            Self::TransportClosed => "channel-closed",
            Self::Platform { error, .. } => &error.code,
            Self::NotImplemented { .. } => "not-implemented",
            Self::Codec(_) => "codec-error",
        }
    }
}
