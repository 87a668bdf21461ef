//! The four-kind ASCII packet grammar and the FILE side-channel form.

pub mod flags;
pub mod wire;

pub use flags::StartFlags;
pub use wire::{FileFrame, Packet};
