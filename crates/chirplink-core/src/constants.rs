//! Protocol constants for the chirplink wire format.

/// Maximum number of payload bytes carried by one DATA packet.
///
/// Base-64 of 75 bytes is exactly 100 characters, which together with the
/// largest DATA/PARITY header still fits inside [`MAX_FRAME_LEN`].
pub const CHUNK_SIZE: usize = 75;

/// Maximum length of one framed ASCII burst, including the header.
pub const MAX_FRAME_LEN: usize = 140;

/// Highest permitted chunk sequence number (1-based).
pub const MAX_SEQ: u32 = 9_999_999;

/// Length of an MD5 digest in base-64, including padding.
pub const MD5_B64_LEN: usize = 24;

// Receive-session timeout shape: max(MIN, BASE + total * PER_PACKET * mult).
pub const SESSION_TIMEOUT_BASE_MS: u64 = 30_000;
pub const SESSION_TIMEOUT_PER_PACKET_MS: u64 = 5_000;
pub const MIN_SESSION_TIMEOUT_MS: u64 = 60_000;
