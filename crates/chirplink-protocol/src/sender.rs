//! The sending pipeline.
//!
//! One `send` drives a whole transmission: mint a session id, optionally
//! gzip, hash the transmitted stream, slice into chunks, compute every
//! parity symbol eagerly (so replays need no recomputation), then emit
//! START, DATA in seq order, PARITY in plan order, and END. Each frame
//! waits for the acoustic layer to finish playback, then pauses for the
//! protocol's inter-packet delay; that is the only pacing in the system.

use std::time::SystemTime;

use chirplink_core::codec;
use chirplink_core::constants::MAX_SEQ;
use chirplink_core::packet::{Packet, StartFlags};
use chirplink_core::session::SessionId;
use chirplink_core::types::ParityId;

use crate::error::SendError;
use crate::events::{ProgressEvent, SendStage};
use crate::fec::{self, FecScheme};
use crate::retransmit::{RetransmitStore, SendSession};
use crate::transport::{FrameTransport, ProtocolTag};

/// Per-message send options.
#[derive(Debug, Clone, Copy)]
pub struct SendOptions {
    /// Gzip the payload before chunking (adds the `C` flag).
    pub compress: bool,
    pub scheme: FecScheme,
}

impl Default for SendOptions {
    fn default() -> Self {
        Self {
            compress: false,
            scheme: fec::NONE,
        }
    }
}

/// Drives transmissions over a [`FrameTransport`] and retains finished
/// sessions for replay.
pub struct Sender<T: FrameTransport> {
    transport: T,
    protocol: ProtocolTag,
    store: RetransmitStore,
}

impl<T: FrameTransport> Sender<T> {
    pub fn new(transport: T, protocol: ProtocolTag) -> Self {
        Self {
            transport,
            protocol,
            store: RetransmitStore::new(),
        }
    }

    pub fn protocol(&self) -> &ProtocolTag {
        &self.protocol
    }

    pub fn store(&self) -> &RetransmitStore {
        &self.store
    }

    pub fn store_mut(&mut self) -> &mut RetransmitStore {
        &mut self.store
    }

    /// Transmit one message. Returns the session id on success; on a
    /// transport failure the partially-sent session stays in the store so
    /// the caller can finish it with explicit resends.
    pub async fn send(
        &mut self,
        message: &[u8],
        options: SendOptions,
        mut progress: impl FnMut(ProgressEvent),
    ) -> Result<SessionId, SendError> {
        let session = SessionId::generate();

        let mut compressed = false;
        let payload = if options.compress {
            compressed = true;
            codec::gzip_compress(message)?
        } else {
            message.to_vec()
        };

        // The hash covers the transmitted stream, i.e. after compression.
        let hash = codec::md5_base64(&payload);
        let chunks = codec::split_chunks(&payload);
        if chunks.len() as u64 > MAX_SEQ as u64 {
            return Err(SendError::TooManyChunks(chunks.len()));
        }
        let total = chunks.len() as u32;
        let parity = fec::parity::build_parity(&chunks, &options.scheme);

        tracing::info!(
            sid = %session,
            total,
            parity = parity.len(),
            scheme = options.scheme.name,
            compressed,
            "starting transmission"
        );

        self.store.insert(SendSession {
            session: session.clone(),
            chunks: chunks.clone(),
            parity: parity.clone(),
            total,
            sent_chunks: 0,
            sent_parity: 0,
            protocol: self.protocol.clone(),
            scheme: options.scheme,
            hash: hash.clone(),
            compressed,
            created_at: SystemTime::now(),
        });

        let flags = StartFlags {
            compressed,
            fec_token: (!options.scheme.is_none()).then(|| options.scheme.name.to_string()),
        };
        let protocol = self.protocol.clone();

        let frame = Packet::Start {
            session: session.clone(),
            hash,
            total,
            flags,
        }
        .serialize();
        emit_frame(&self.transport, &frame, &protocol).await?;
        progress(ProgressEvent {
            stage: SendStage::Start,
            current: 0,
            total: total as usize,
            session: session.to_string(),
            frame,
            parity_id: None,
        });

        for (index, chunk) in chunks.iter().enumerate() {
            let seq = index as u32 + 1;
            let frame = Packet::Data {
                session: session.clone(),
                seq,
                chunk: chunk.clone(),
            }
            .serialize();
            emit_frame(&self.transport, &frame, &protocol).await?;
            self.store.mark_chunk_sent(session.as_str());
            progress(ProgressEvent {
                stage: SendStage::Data,
                current: seq as usize,
                total: total as usize,
                session: session.to_string(),
                frame,
                parity_id: None,
            });
        }

        let parity_total = parity.len();
        for (index, (id, symbol)) in parity.iter().enumerate() {
            let frame = Packet::Parity {
                session: session.clone(),
                id: *id,
                payload: symbol.clone(),
            }
            .serialize();
            emit_frame(&self.transport, &frame, &protocol).await?;
            self.store.mark_parity_sent(session.as_str());
            progress(ProgressEvent {
                stage: SendStage::Parity,
                current: index + 1,
                total: parity_total,
                session: session.to_string(),
                frame,
                parity_id: Some(id.to_string()),
            });
        }

        let frame = Packet::End {
            session: session.clone(),
        }
        .serialize();
        emit_frame(&self.transport, &frame, &protocol).await?;
        progress(ProgressEvent {
            stage: SendStage::End,
            current: total as usize,
            total: total as usize,
            session: session.to_string(),
            frame,
            parity_id: None,
        });

        Ok(session)
    }

    /// Replay specific DATA packets of a retained session, in the given
    /// order, using the session's original protocol tag.
    pub async fn resend_chunks(&mut self, sid: &str, seqs: &[u32]) -> Result<(), SendError> {
        let retained = self
            .store
            .get(sid)
            .ok_or_else(|| SendError::UnknownSession(sid.to_string()))?;
        let protocol = retained.protocol.clone();

        let mut frames = Vec::with_capacity(seqs.len());
        for &seq in seqs {
            let chunk = retained.chunk(seq).ok_or(SendError::UnknownChunk {
                session: sid.to_string(),
                seq,
            })?;
            frames.push(
                Packet::Data {
                    session: retained.session.clone(),
                    seq,
                    chunk: chunk.to_vec(),
                }
                .serialize(),
            );
        }

        for frame in frames {
            emit_frame(&self.transport, &frame, &protocol).await?;
            self.store.mark_chunk_sent(sid);
        }
        Ok(())
    }

    /// Replay specific PARITY packets of a retained session.
    pub async fn resend_parity(&mut self, sid: &str, ids: &[ParityId]) -> Result<(), SendError> {
        let retained = self
            .store
            .get(sid)
            .ok_or_else(|| SendError::UnknownSession(sid.to_string()))?;
        let protocol = retained.protocol.clone();

        let mut frames = Vec::with_capacity(ids.len());
        for id in ids {
            let symbol = retained
                .parity_symbol(id)
                .ok_or_else(|| SendError::UnknownParity {
                    session: sid.to_string(),
                    id: id.to_string(),
                })?;
            frames.push(
                Packet::Parity {
                    session: retained.session.clone(),
                    id: *id,
                    payload: symbol.to_vec(),
                }
                .serialize(),
            );
        }

        for frame in frames {
            emit_frame(&self.transport, &frame, &protocol).await?;
            self.store.mark_parity_sent(sid);
        }
        Ok(())
    }
}

/// Transmit one frame, await playback completion, then pause for the
/// protocol's inter-packet delay.
async fn emit_frame<T: FrameTransport>(
    transport: &T,
    frame: &str,
    protocol: &ProtocolTag,
) -> Result<(), SendError> {
    transport.transmit(frame, protocol).await?;
    let delay = protocol.inter_packet_delay();
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
    Ok(())
}
