//! Session identifiers.
//!
//! A session id names one message transmission. The sender mints it as
//! `⟨unix-seconds⟩-⟨6-digit-zero-padded-nonce⟩`; receivers treat the token
//! as opaque, so any colon-free printable ASCII token parses.

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use rand::Rng;

use crate::error::PacketError;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[must_use]
pub struct SessionId(String);

impl SessionId {
    /// Mint a fresh id for an outgoing message.
    pub fn generate() -> Self {
        let secs = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        let nonce: u32 = rand::thread_rng().gen_range(0..1_000_000);
        Self(format!("{secs}-{nonce:06}"))
    }

    /// Accept a received id. The receiver imposes no structure beyond
    /// "non-empty printable ASCII without a colon".
    pub fn parse(token: &str) -> Result<Self, PacketError> {
        let ok = !token.is_empty()
            && token.bytes().all(|b| b.is_ascii_graphic() && b != b':');
        if !ok {
            return Err(PacketError::InvalidSessionId);
        }
        Ok(Self(token.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
