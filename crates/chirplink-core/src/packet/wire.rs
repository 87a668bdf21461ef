//! Wire parsing and serialisation for the framed ASCII packet grammar.
//!
//! All four kinds are colon-delimited and fit in one ≤140-character frame:
//!
//! ```text
//! S:{sid}::{hash}:{total}[:{flags}]
//! D:{sid}:{seq}:{b64(chunk)}
//! P:{sid}:{parity-id}:{b64(parity)}
//! E:{sid}::
//! ```
//!
//! The final field owns any remaining colons (the parser rejoins the tail),
//! and base-64 payload fields are validated and decoded at parse time so a
//! malformed frame is rejected before it can touch session state.

use crate::codec::{base64_decode, base64_encode};
use crate::error::PacketError;
use crate::packet::flags::StartFlags;
use crate::session::SessionId;
use crate::types::ParityId;

/// A parsed protocol packet.
#[derive(Debug, Clone, PartialEq, Eq)]
#[must_use]
pub enum Packet {
    Start {
        session: SessionId,
        /// MD5 of the transmitted byte stream, padded base-64.
        hash: String,
        /// Total DATA chunk count.
        total: u32,
        flags: StartFlags,
    },
    Data {
        session: SessionId,
        /// 1-based chunk sequence number.
        seq: u32,
        chunk: Vec<u8>,
    },
    Parity {
        session: SessionId,
        id: ParityId,
        payload: Vec<u8>,
    },
    End {
        session: SessionId,
    },
}

impl Packet {
    /// Whether a raw frame claims to be protocol traffic at all.
    ///
    /// Frames that match none of the structured prefixes are plaintext
    /// messages and bypass parsing entirely.
    pub fn is_structured(raw: &str) -> bool {
        raw.starts_with("S:")
            || raw.starts_with("D:")
            || raw.starts_with("P:")
            || raw.starts_with("E:")
            || raw.starts_with("FILE:")
    }

    /// Parse one framed burst.
    #[must_use = "parsing may fail; check the Result"]
    pub fn parse(raw: &str) -> Result<Self, PacketError> {
        if raw.is_empty() {
            return Err(PacketError::Empty);
        }
        let (kind, rest) = raw.split_at_checked(2).ok_or(PacketError::UnknownPrefix)?;
        match kind {
            "S:" => Self::parse_start(rest),
            "D:" => Self::parse_data(rest),
            "P:" => Self::parse_parity(rest),
            "E:" => Self::parse_end(rest),
            _ => Err(PacketError::UnknownPrefix),
        }
    }

    // S:{sid}::{hash}:{total}[:{flags}], fields after the prefix:
    // sid, (empty), hash, total, optional flags. The flags field is the
    // tail, so it keeps any further colons.
    fn parse_start(rest: &str) -> Result<Self, PacketError> {
        let parts: Vec<&str> = rest.splitn(5, ':').collect();
        if parts.len() < 4 {
            return Err(PacketError::NotEnoughFields {
                min: 4,
                actual: parts.len(),
            });
        }
        let session = SessionId::parse(parts[0])?;
        let hash = parts[2];
        if hash.is_empty() {
            return Err(PacketError::MissingHash);
        }
        let total: u32 = parts[3]
            .parse()
            .map_err(|_| PacketError::InvalidTotal(parts[3].to_string()))?;
        if total > crate::constants::MAX_SEQ {
            return Err(PacketError::InvalidTotal(parts[3].to_string()));
        }
        let flags = StartFlags::parse(parts.get(4).copied().unwrap_or(""));
        Ok(Packet::Start {
            session,
            hash: hash.to_string(),
            total,
            flags,
        })
    }

    fn parse_data(rest: &str) -> Result<Self, PacketError> {
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        if parts.len() < 3 {
            return Err(PacketError::NotEnoughFields {
                min: 3,
                actual: parts.len(),
            });
        }
        let session = SessionId::parse(parts[0])?;
        let seq: u32 = parts[1]
            .parse()
            .map_err(|_| PacketError::InvalidSeq(parts[1].to_string()))?;
        if seq == 0 || seq > crate::constants::MAX_SEQ {
            return Err(PacketError::SeqOutOfRange(seq));
        }
        let chunk = base64_decode(parts[2])?;
        Ok(Packet::Data {
            session,
            seq,
            chunk,
        })
    }

    fn parse_parity(rest: &str) -> Result<Self, PacketError> {
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        if parts.len() < 3 {
            return Err(PacketError::NotEnoughFields {
                min: 3,
                actual: parts.len(),
            });
        }
        let session = SessionId::parse(parts[0])?;
        let id: ParityId = parts[1].parse()?;
        let payload = base64_decode(parts[2])?;
        Ok(Packet::Parity {
            session,
            id,
            payload,
        })
    }

    fn parse_end(rest: &str) -> Result<Self, PacketError> {
        let sid = rest.split(':').next().unwrap_or("");
        let session = SessionId::parse(sid)?;
        Ok(Packet::End { session })
    }

    /// Serialise back to the framed ASCII form.
    ///
    /// With `CHUNK_SIZE`-bounded payloads the result always fits
    /// [`MAX_FRAME_LEN`](crate::constants::MAX_FRAME_LEN).
    #[must_use = "serialisation produces the frame without sending it"]
    pub fn serialize(&self) -> String {
        match self {
            Packet::Start {
                session,
                hash,
                total,
                flags,
            } => match flags.serialize() {
                // An empty flag field is omitted together with its colon;
                // a trailing ':' is never emitted.
                None => format!("S:{session}::{hash}:{total}"),
                Some(field) => format!("S:{session}::{hash}:{total}:{field}"),
            },
            Packet::Data {
                session,
                seq,
                chunk,
            } => format!("D:{session}:{seq}:{}", base64_encode(chunk)),
            Packet::Parity {
                session,
                id,
                payload,
            } => format!("P:{session}:{id}:{}", base64_encode(payload)),
            Packet::End { session } => format!("E:{session}::"),
        }
    }

    /// Duplicate-suppression key: `{type}:{sid}:{field3}` with the parity
    /// field canonical, so `"1-3"` and `"1-3-0"` collapse to one id.
    pub fn packet_id(&self) -> String {
        match self {
            Packet::Start { session, .. } => format!("S:{session}:"),
            Packet::Data { session, seq, .. } => format!("D:{session}:{seq}"),
            Packet::Parity { session, id, .. } => format!("P:{session}:{id}"),
            Packet::End { session } => format!("E:{session}:"),
        }
    }

    pub fn session(&self) -> &SessionId {
        match self {
            Packet::Start { session, .. }
            | Packet::Data { session, .. }
            | Packet::Parity { session, .. }
            | Packet::End { session } => session,
        }
    }
}

/// The `FILE:{batchId}:{filename}:{b64(zip)}` side-channel form.
///
/// Seen either as a direct frame or as the reassembled payload of a whole
/// session; both routes hand the decoded batch to the file adapter instead
/// of the text delivery callback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFrame {
    pub batch_id: String,
    pub filename: String,
    /// Decoded archive bytes.
    pub data: Vec<u8>,
}

impl FileFrame {
    pub fn parse(raw: &str) -> Result<Self, PacketError> {
        let rest = raw.strip_prefix("FILE:").ok_or(PacketError::UnknownPrefix)?;
        let parts: Vec<&str> = rest.splitn(3, ':').collect();
        if parts.len() < 3 {
            return Err(PacketError::NotEnoughFields {
                min: 3,
                actual: parts.len(),
            });
        }
        if parts[0].is_empty() || parts[1].is_empty() {
            return Err(PacketError::NotEnoughFields {
                min: 3,
                actual: parts.len(),
            });
        }
        let data = base64_decode(parts[2])?;
        Ok(FileFrame {
            batch_id: parts[0].to_string(),
            filename: parts[1].to_string(),
            data,
        })
    }
}
