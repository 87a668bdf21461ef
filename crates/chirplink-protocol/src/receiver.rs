//! Per-session receive state machine.
//!
//! The receiver is pure and synchronous: frames and the current time come
//! in, [`ReceiverEvent`]s come out. The async shell in [`crate::service`]
//! owns the clock and the frame stream.
//!
//! Malformed or duplicate traffic is dropped with a diagnostic log and
//! never aborts a session; a session leaves the map exactly once, through
//! delivery, a hash mismatch, or its deadline. Removing the session is what
//! cancels its timer, so cancellation cannot race the terminal transition.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::time::{Duration, Instant};

use chirplink_core::codec;
use chirplink_core::constants::{
    CHUNK_SIZE, MIN_SESSION_TIMEOUT_MS, SESSION_TIMEOUT_BASE_MS, SESSION_TIMEOUT_PER_PACKET_MS,
};
use chirplink_core::packet::{FileFrame, Packet, StartFlags};
use chirplink_core::types::ParityId;

use crate::events::{AbortReason, ReceiverEvent};
use crate::fec::plan::group_plan;
use crate::fec::recovery::run_recovery;
use crate::fec::{self, FecScheme};
use crate::transport::ProtocolTag;

/// Receiver tuning. Defaults match the protocol constants.
#[derive(Debug, Clone)]
pub struct ReceiverConfig {
    /// Acoustic protocol this receiver listens with; scales timeouts.
    pub protocol: ProtocolTag,
    /// Scheme assumed when a START names an unknown token.
    pub default_scheme: FecScheme,
    pub base_timeout: Duration,
    pub per_packet_timeout: Duration,
    pub min_timeout: Duration,
}

impl Default for ReceiverConfig {
    fn default() -> Self {
        Self {
            protocol: ProtocolTag::new("NORMAL"),
            default_scheme: fec::DEFAULT_SCHEME,
            base_timeout: Duration::from_millis(SESSION_TIMEOUT_BASE_MS),
            per_packet_timeout: Duration::from_millis(SESSION_TIMEOUT_PER_PACKET_MS),
            min_timeout: Duration::from_millis(MIN_SESSION_TIMEOUT_MS),
        }
    }
}

struct ReceiveSession {
    total: u32,
    expected_hash: String,
    compressed: bool,
    scheme: FecScheme,
    chunks: BTreeMap<u32, Vec<u8>>,
    parity: HashMap<ParityId, Vec<u8>>,
    seen: HashSet<String>,
    deadline: Instant,
    recovered: u32,
}

/// Reassembles concurrent sessions from decoded frames.
pub struct Receiver {
    config: ReceiverConfig,
    sessions: HashMap<String, ReceiveSession>,
}

impl Receiver {
    pub fn new(config: ReceiverConfig) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
        }
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Earliest session deadline, for the shell's timer.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.sessions.values().map(|s| s.deadline).min()
    }

    /// Process one decoded frame.
    pub fn handle_frame(&mut self, raw: &str, now: Instant) -> Vec<ReceiverEvent> {
        if !Packet::is_structured(raw) {
            // Anything that is not protocol traffic is a plaintext message.
            return vec![ReceiverEvent::Message {
                body: raw.as_bytes().to_vec(),
            }];
        }

        if raw.starts_with("FILE:") {
            return match FileFrame::parse(raw) {
                Ok(file) => vec![ReceiverEvent::FileBatch(file)],
                Err(err) => {
                    tracing::debug!(%err, "dropping malformed FILE frame");
                    Vec::new()
                }
            };
        }

        let packet = match Packet::parse(raw) {
            Ok(packet) => packet,
            Err(err) => {
                tracing::debug!(%err, frame = raw, "dropping malformed frame");
                return Vec::new();
            }
        };

        let packet_id = packet.packet_id();
        match packet {
            Packet::Start {
                session,
                hash,
                total,
                flags,
            } => self.on_start(session.as_str(), hash, total, flags, now),
            Packet::Data {
                session,
                seq,
                chunk,
            } => self.on_data(session.as_str(), seq, chunk, packet_id),
            Packet::Parity {
                session,
                id,
                payload,
            } => self.on_parity(session.as_str(), id, payload, packet_id),
            Packet::End { session } => self.on_end(session.as_str()),
        }
    }

    /// Delete sessions whose deadline has passed.
    pub fn poll_timeouts(&mut self, now: Instant) -> Vec<ReceiverEvent> {
        let expired: Vec<String> = self
            .sessions
            .iter()
            .filter(|(_, session)| session.deadline <= now)
            .map(|(sid, _)| sid.clone())
            .collect();

        let mut events = Vec::new();
        for sid in expired {
            if let Some(session) = self.sessions.remove(&sid) {
                let missing: Vec<u32> = (1..=session.total)
                    .filter(|seq| !session.chunks.contains_key(seq))
                    .collect();
                tracing::warn!(
                    sid = %sid,
                    received = session.chunks.len(),
                    missing = missing.len(),
                    parity = session.parity.len(),
                    "session timed out"
                );
                tracing::debug!(sid = %sid, ?missing, "timed-out session inventory");
                events.push(ReceiverEvent::Aborted {
                    session: sid,
                    reason: AbortReason::Timeout,
                });
            }
        }
        events
    }

    fn session_timeout(&self, total: u32) -> Duration {
        let mult = self.config.protocol.timeout_multiplier();
        let scaled = self.config.base_timeout + self.config.per_packet_timeout * (total * mult);
        scaled.max(self.config.min_timeout)
    }

    fn on_start(
        &mut self,
        sid: &str,
        hash: String,
        total: u32,
        flags: StartFlags,
        now: Instant,
    ) -> Vec<ReceiverEvent> {
        let scheme = match &flags.fec_token {
            None => fec::NONE,
            Some(token) => FecScheme::from_token(token).unwrap_or_else(|| {
                tracing::warn!(
                    sid,
                    token,
                    fallback = self.config.default_scheme.name,
                    "unknown FEC scheme token; assuming default"
                );
                self.config.default_scheme
            }),
        };

        // Last START wins: drop the old state, and with it the old timer.
        if self.sessions.remove(sid).is_some() {
            tracing::debug!(sid, "replacing existing session");
        }

        let deadline = now + self.session_timeout(total);
        tracing::info!(
            sid,
            total,
            scheme = scheme.name,
            compressed = flags.compressed,
            "session opened"
        );
        self.sessions.insert(
            sid.to_string(),
            ReceiveSession {
                total,
                expected_hash: hash,
                compressed: flags.compressed,
                scheme,
                chunks: BTreeMap::new(),
                parity: HashMap::new(),
                seen: HashSet::new(),
                deadline,
                recovered: 0,
            },
        );

        let mut events = vec![ReceiverEvent::Opened {
            session: sid.to_string(),
            total,
        }];
        // An empty message is complete as soon as it is announced.
        events.extend(self.after_packet(sid));
        events
    }

    fn on_data(
        &mut self,
        sid: &str,
        seq: u32,
        chunk: Vec<u8>,
        packet_id: String,
    ) -> Vec<ReceiverEvent> {
        let Some(session) = self.sessions.get_mut(sid) else {
            tracing::debug!(sid, seq, "data for unknown session");
            return Vec::new();
        };
        if seq > session.total {
            tracing::debug!(sid, seq, total = session.total, "data seq out of range");
            return Vec::new();
        }
        if !session.seen.insert(packet_id) {
            tracing::debug!(sid, seq, "duplicate data packet");
            return Vec::new();
        }

        session.chunks.insert(seq, chunk);
        let mut events = vec![ReceiverEvent::ChunkStored {
            session: sid.to_string(),
            received: session.chunks.len(),
            total: session.total,
        }];
        events.extend(self.after_packet(sid));
        events
    }

    fn on_parity(
        &mut self,
        sid: &str,
        id: ParityId,
        payload: Vec<u8>,
        packet_id: String,
    ) -> Vec<ReceiverEvent> {
        let Some(session) = self.sessions.get_mut(sid) else {
            tracing::debug!(sid, id = %id, "parity for unknown session");
            return Vec::new();
        };
        if !session.seen.insert(packet_id) {
            tracing::debug!(sid, id = %id, "duplicate parity packet");
            return Vec::new();
        }
        if payload.len() != CHUNK_SIZE {
            tracing::debug!(
                sid,
                id = %id,
                len = payload.len(),
                "parity symbol has wrong length"
            );
            return Vec::new();
        }

        session.parity.entry(id).or_insert(payload);
        self.after_packet(sid)
    }

    fn on_end(&mut self, sid: &str) -> Vec<ReceiverEvent> {
        // END is advisory: it neither clears the session nor is required
        // for completion, but it is a natural point to re-check.
        if self.sessions.contains_key(sid) {
            self.after_packet(sid)
        } else {
            Vec::new()
        }
    }

    /// Run recovery and the completion check after any state change.
    fn after_packet(&mut self, sid: &str) -> Vec<ReceiverEvent> {
        let Some(session) = self.sessions.get_mut(sid) else {
            return Vec::new();
        };

        if (session.chunks.len() as u32) < session.total {
            let plan = group_plan(session.total, &session.scheme);
            let repaired = run_recovery(
                session.total,
                &plan,
                &mut session.chunks,
                &session.parity,
            );
            if !repaired.is_empty() {
                session.recovered += repaired.len() as u32;
                tracing::info!(sid, ?repaired, "fec recovery");
            }
        }

        if session.chunks.len() as u32 == session.total {
            self.finish(sid)
        } else {
            Vec::new()
        }
    }

    /// Terminal transition: hash gate, optional gunzip, FILE reroute.
    fn finish(&mut self, sid: &str) -> Vec<ReceiverEvent> {
        let Some(session) = self.sessions.remove(sid) else {
            return Vec::new();
        };

        let size = session.chunks.values().map(Vec::len).sum();
        let mut stream = Vec::with_capacity(size);
        for chunk in session.chunks.values() {
            stream.extend_from_slice(chunk);
        }

        let actual = codec::md5_base64(&stream);
        if actual != session.expected_hash {
            tracing::warn!(
                sid,
                expected = %session.expected_hash,
                actual = %actual,
                "hash mismatch; dropping session"
            );
            return vec![ReceiverEvent::Aborted {
                session: sid.to_string(),
                reason: AbortReason::HashMismatch,
            }];
        }

        let body = if session.compressed {
            match codec::gzip_decompress(&stream) {
                Ok(decompressed) => decompressed,
                Err(err) => {
                    tracing::warn!(sid, %err, "gunzip failed; delivering raw stream");
                    stream
                }
            }
        } else {
            stream
        };

        tracing::info!(
            sid,
            bytes = body.len(),
            recovered = session.recovered,
            "session complete"
        );
        let mut events = vec![ReceiverEvent::Completed {
            session: sid.to_string(),
            recovered_chunks: session.recovered,
        }];

        if body.starts_with(b"FILE:") {
            let parsed = std::str::from_utf8(&body)
                .ok()
                .and_then(|text| FileFrame::parse(text).ok());
            match parsed {
                Some(file) => events.push(ReceiverEvent::FileBatch(file)),
                None => {
                    tracing::warn!(sid, "FILE-prefixed payload failed to parse; delivering as text");
                    events.push(ReceiverEvent::Message { body });
                }
            }
        } else {
            events.push(ReceiverEvent::Message { body });
        }
        events
    }
}
