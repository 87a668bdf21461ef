//! Protocol state machines for the chirplink acoustic transfer stack.
//!
//! This crate implements the stateful protocol logic above the framed
//! acoustic transport: the forward-error-correction engine, the sending
//! pipeline, the per-session receive state machine, and the retransmit
//! store. State machines are pure and synchronous; the async shells in
//! [`sender`] and [`service`] bridge them to a [`transport::FrameTransport`].

pub mod error;
pub mod events;
pub mod fec;
pub mod receiver;
pub mod retransmit;
pub mod sender;
pub mod service;
pub mod transport;

pub use error::SendError;
pub use events::{AbortReason, ProgressEvent, ReceiverEvent, SendStage};
pub use fec::FecScheme;
pub use receiver::{Receiver, ReceiverConfig};
pub use retransmit::{RetransmitStore, SendSession, SendSessionSummary};
pub use sender::{SendOptions, Sender};
pub use transport::{FrameTransport, ProtocolTag, TransportError};
