//! Protocol error types.
//!
//! Sender-side failures surface as `Err` so a caller can retry or resend;
//! receiver-side anomalies are handled by the drop/abort policies inside
//! [`crate::receiver`] and never become `Err` values.

use chirplink_core::constants::MAX_SEQ;
use chirplink_core::error::CodecError;

use crate::transport::TransportError;

#[derive(Debug, thiserror::Error)]
pub enum SendError {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("message splits into {0} chunks (maximum {MAX_SEQ})")]
    TooManyChunks(usize),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("unknown send session: {0}")]
    UnknownSession(String),

    #[error("chunk {seq} is not part of session {session}")]
    UnknownChunk { session: String, seq: u32 },

    #[error("parity {id} is not part of session {session}")]
    UnknownParity { session: String, id: String },
}
