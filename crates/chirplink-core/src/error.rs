//! Error types for the chirplink-core crate.
//!
//! Parse and codec failures are typed so the receiver can map them to its
//! drop-with-diagnostic policy; nothing here aborts a session by itself.

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("base64 length {0} is not a multiple of 4")]
    Base64Length(usize),

    #[error("invalid base64 character {found:?} at position {pos}")]
    Base64Charset { found: char, pos: usize },

    #[error("base64 decode failed: {0}")]
    Base64Decode(String),

    #[error("gzip compression failed: {0}")]
    CompressionFailed(String),

    #[error("gzip decompression failed: {0}")]
    DecompressionFailed(String),
}

#[derive(Debug, thiserror::Error)]
pub enum PacketError {
    #[error("empty frame")]
    Empty,

    #[error("unknown packet prefix")]
    UnknownPrefix,

    #[error("expected at least {min} fields, got {actual}")]
    NotEnoughFields { min: usize, actual: usize },

    #[error("invalid session id")]
    InvalidSessionId,

    #[error("missing message hash")]
    MissingHash,

    #[error("invalid chunk total: {0:?}")]
    InvalidTotal(String),

    #[error("invalid sequence number: {0:?}")]
    InvalidSeq(String),

    #[error("sequence {0} out of range")]
    SeqOutOfRange(u32),

    #[error("invalid parity id: {0:?}")]
    InvalidParityId(String),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),
}
