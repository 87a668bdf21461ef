//! Events crossing the protocol boundary: sender progress and receiver
//! deliveries. Progress events are serde-serialisable so embedders can
//! forward them to UIs or logs unchanged.

use serde::Serialize;

use chirplink_core::packet::FileFrame;

/// Which emission stage a progress event refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SendStage {
    Start,
    Data,
    Parity,
    End,
}

/// Emitted by the sender after each frame finishes playing.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressEvent {
    pub stage: SendStage,
    /// Position within the stage (1-based for data/parity, 0 otherwise).
    pub current: usize,
    /// Stage size: chunk count for data, symbol count for parity.
    pub total: usize,
    pub session: String,
    /// The serialised frame that was just transmitted.
    pub frame: String,
    /// Canonical parity id, for parity frames only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parity_id: Option<String>,
}

/// Why a receive session ended without delivering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    HashMismatch,
    Timeout,
}

/// Emitted by the receiver as frames arrive and sessions resolve.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReceiverEvent {
    /// A complete message: either a plaintext passthrough frame or a
    /// reassembled (and possibly decompressed) session payload.
    Message { body: Vec<u8> },
    /// A decoded file batch, from a direct FILE frame or a reassembled
    /// payload; suppresses the corresponding `Message`.
    FileBatch(FileFrame),
    /// A valid START opened (or replaced) a session.
    Opened { session: String, total: u32 },
    /// A chunk was stored; `received` counts distinct chunks held.
    ChunkStored {
        session: String,
        received: usize,
        total: u32,
    },
    /// A session reassembled and passed the hash gate.
    Completed {
        session: String,
        recovered_chunks: u32,
    },
    /// A session ended without delivery.
    Aborted {
        session: String,
        reason: AbortReason,
    },
}
