//! The framed acoustic transport boundary.
//!
//! The core treats the modem as an opaque frame carrier: one send primitive
//! that resolves when playback completes, and a stream of decoded ASCII
//! frames on the receive side (undecodable audio never reaches the core).
//! Pacing and timeout scaling derive from the acoustic protocol tag.

use std::fmt;
use std::future::Future;
use std::time::Duration;

use serde::Serialize;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("modem is not available")]
    Unavailable,

    #[error("frame playback failed: {0}")]
    Playback(String),
}

/// One-way frame emission into the acoustic layer.
///
/// Implementations bridge to actual audio I/O; the protocol crate only
/// sequences frames and awaits playback completion.
pub trait FrameTransport: Send + Sync {
    /// Transmit a single ≤140-character ASCII frame using the given
    /// acoustic protocol. Resolves once the frame finished playing.
    fn transmit(
        &self,
        frame: &str,
        protocol: &ProtocolTag,
    ) -> impl Future<Output = Result<(), TransportError>> + Send;
}

/// Name of an acoustic protocol, e.g. `"NORMAL"` or `"ultrasonic FASTEST"`.
///
/// Speed classes are recognised by substring, matching how the modem
/// libraries tag their protocol variants.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct ProtocolTag(String);

impl ProtocolTag {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Pause inserted after each frame finishes playing, so slow receivers
    /// can flush their decoder between bursts.
    pub fn inter_packet_delay(&self) -> Duration {
        if self.0.contains("FASTEST") {
            Duration::from_millis(200)
        } else if self.0.contains("FAST") {
            Duration::from_millis(500)
        } else if self.0.contains("NORMAL") {
            Duration::from_millis(1000)
        } else {
            Duration::ZERO
        }
    }

    /// Receive-timeout scaling: slower protocols get proportionally more
    /// time per expected packet.
    pub fn timeout_multiplier(&self) -> u32 {
        if self.0.contains("FASTEST") {
            1
        } else if self.0.contains("FAST") {
            2
        } else if self.0.contains("NORMAL") {
            3
        } else {
            1
        }
    }
}

impl fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
