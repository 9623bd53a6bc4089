//! Shared error types.

use thiserror::Error;

/// Failure to interpret something received from (or destined for) the wire.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("unknown channel: {0}")]
    UnknownChannel(String),

    #[error("malformed subscription key: {0}")]
    InvalidKey(String),

    #[error("unknown event: {0}")]
    UnknownEvent(String),

    #[error("malformed {channel} payload: {source}")]
    Payload {
        channel: &'static str,
        #[source]
        source: serde_json::Error,
    },

    #[error("malformed frame: {0}")]
    Frame(#[from] serde_json::Error),
}
