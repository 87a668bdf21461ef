//! Sender-side session retention for caller-driven replay.
//!
//! The protocol has no feedback path, so nothing here retries on its own.
//! A completed (or partially sent) transmission stays in the store until it
//! ages out or the caller deletes it, and specific chunks or parity symbols
//! can be replayed on request through the [`Sender`](crate::sender::Sender).

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;

use chirplink_core::session::SessionId;
use chirplink_core::types::ParityId;

use crate::error::SendError;
use crate::fec::FecScheme;
use crate::transport::ProtocolTag;

/// Everything retained about one outgoing transmission.
#[derive(Debug, Clone)]
pub struct SendSession {
    pub session: SessionId,
    /// `chunks[i]` holds the chunk with `seq == i + 1`.
    pub chunks: Vec<Vec<u8>>,
    /// Parity symbols in plan order.
    pub parity: Vec<(ParityId, Vec<u8>)>,
    pub total: u32,
    /// DATA frames emitted so far, replays included.
    pub sent_chunks: u64,
    /// PARITY frames emitted so far, replays included.
    pub sent_parity: u64,
    pub protocol: ProtocolTag,
    pub scheme: FecScheme,
    /// MD5 of the transmitted stream, padded base-64.
    pub hash: String,
    pub compressed: bool,
    pub created_at: SystemTime,
}

impl SendSession {
    pub fn chunk(&self, seq: u32) -> Option<&[u8]> {
        if seq == 0 {
            return None;
        }
        self.chunks.get((seq - 1) as usize).map(Vec::as_slice)
    }

    pub fn parity_symbol(&self, id: &ParityId) -> Option<&[u8]> {
        self.parity
            .iter()
            .find(|(pid, _)| pid == id)
            .map(|(_, symbol)| symbol.as_slice())
    }

    fn summary(&self) -> SendSessionSummary {
        SendSessionSummary {
            session: self.session.to_string(),
            total: self.total,
            parity_count: self.parity.len(),
            sent_chunks: self.sent_chunks,
            sent_parity: self.sent_parity,
            protocol: self.protocol.as_str().to_string(),
            scheme: self.scheme.name.to_string(),
            hash: self.hash.clone(),
            compressed: self.compressed,
            created_unix: self
                .created_at
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
        }
    }
}

/// Listing snapshot of a retained session.
#[derive(Debug, Clone, Serialize)]
pub struct SendSessionSummary {
    pub session: String,
    pub total: u32,
    pub parity_count: usize,
    pub sent_chunks: u64,
    pub sent_parity: u64,
    pub protocol: String,
    pub scheme: String,
    pub hash: String,
    pub compressed: bool,
    pub created_unix: u64,
}

/// Map of retained send sessions, keyed by session id.
#[derive(Debug, Default)]
pub struct RetransmitStore {
    sessions: HashMap<String, SendSession>,
}

impl RetransmitStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, session: SendSession) {
        self.sessions
            .insert(session.session.to_string(), session);
    }

    pub fn get(&self, sid: &str) -> Option<&SendSession> {
        self.sessions.get(sid)
    }

    pub(crate) fn mark_chunk_sent(&mut self, sid: &str) {
        if let Some(session) = self.sessions.get_mut(sid) {
            session.sent_chunks += 1;
        }
    }

    pub(crate) fn mark_parity_sent(&mut self, sid: &str) {
        if let Some(session) = self.sessions.get_mut(sid) {
            session.sent_parity += 1;
        }
    }

    /// Snapshot all retained sessions, newest first.
    pub fn list(&self) -> Vec<SendSessionSummary> {
        let mut summaries: Vec<SendSessionSummary> =
            self.sessions.values().map(SendSession::summary).collect();
        summaries.sort_by(|a, b| {
            b.created_unix
                .cmp(&a.created_unix)
                .then_with(|| b.session.cmp(&a.session))
        });
        summaries
    }

    /// Delete one session; unknown ids are reported, not ignored.
    pub fn remove(&mut self, sid: &str) -> Result<(), SendError> {
        self.sessions
            .remove(sid)
            .map(|_| ())
            .ok_or_else(|| SendError::UnknownSession(sid.to_string()))
    }

    /// Drop sessions older than `age`. Returns how many were removed.
    pub fn clear_older_than(&mut self, age: Duration) -> usize {
        let now = SystemTime::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, session| {
            now.duration_since(session.created_at)
                .map(|elapsed| elapsed < age)
                .unwrap_or(true)
        });
        before - self.sessions.len()
    }

    /// Drop everything. Returns how many sessions were removed.
    pub fn clear(&mut self) -> usize {
        let count = self.sessions.len();
        self.sessions.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec;

    fn session(sid: &str, created_at: SystemTime) -> SendSession {
        SendSession {
            session: SessionId::parse(sid).unwrap(),
            chunks: vec![b"one".to_vec(), b"two".to_vec()],
            parity: Vec::new(),
            total: 2,
            sent_chunks: 2,
            sent_parity: 0,
            protocol: ProtocolTag::new("NORMAL"),
            scheme: fec::NONE,
            hash: "1B2M2Y8AsgTpgAmY7PhCfg==".to_string(),
            compressed: false,
            created_at,
        }
    }

    #[test]
    fn list_is_newest_first() {
        let now = SystemTime::now();
        let mut store = RetransmitStore::new();
        store.insert(session("older", now - Duration::from_secs(120)));
        store.insert(session("newer", now));

        let listed = store.list();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].session, "newer");
        assert_eq!(listed[1].session, "older");
    }

    #[test]
    fn chunk_lookup_is_one_based() {
        let s = session("s", SystemTime::now());
        assert_eq!(s.chunk(1), Some(&b"one"[..]));
        assert_eq!(s.chunk(2), Some(&b"two"[..]));
        assert_eq!(s.chunk(0), None);
        assert_eq!(s.chunk(3), None);
    }

    #[test]
    fn remove_unknown_session_is_an_error() {
        let mut store = RetransmitStore::new();
        assert!(matches!(
            store.remove("nope"),
            Err(SendError::UnknownSession(_))
        ));

        store.insert(session("yes", SystemTime::now()));
        assert!(store.remove("yes").is_ok());
        assert!(store.is_empty());
    }

    #[test]
    fn clear_older_than_keeps_recent_sessions() {
        let now = SystemTime::now();
        let mut store = RetransmitStore::new();
        store.insert(session("ancient", now - Duration::from_secs(3600)));
        store.insert(session("fresh", now));

        let removed = store.clear_older_than(Duration::from_secs(600));
        assert_eq!(removed, 1);
        assert!(store.get("fresh").is_some());
        assert!(store.get("ancient").is_none());
    }

    #[test]
    fn clear_all() {
        let mut store = RetransmitStore::new();
        store.insert(session("a", SystemTime::now()));
        store.insert(session("b", SystemTime::now()));
        assert_eq!(store.clear(), 2);
        assert!(store.is_empty());
    }
}
