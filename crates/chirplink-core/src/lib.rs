//! Core constants, codec utilities, and wire formats for the chirplink
//! acoustic transfer protocol.
//!
//! This crate defines the framed ASCII packet grammar, session and parity
//! identifiers, and the byte-level helpers (MD5, base64, gzip, chunking)
//! shared by the sender and receiver sides.

pub mod codec;
pub mod constants;
pub mod error;
pub mod packet;
pub mod session;
pub mod types;

pub use error::{CodecError, PacketError};
pub use packet::flags::StartFlags;
pub use packet::wire::{FileFrame, Packet};
pub use session::SessionId;
pub use types::{ParityId, ParityKind};
