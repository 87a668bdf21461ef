//! Parity identifiers.
//!
//! A parity symbol is keyed by the chunk range it covers and a parity kind.
//! The canonical wire form is `{start}-{end}-{kind}`; the two-field form
//! `{start}-{end}` normalises to the primary kind, so `"1-3"` and `"1-3-0"`
//! address the same slot.

use std::fmt;
use std::str::FromStr;

use crate::error::PacketError;

/// Which parity equation a symbol belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParityKind {
    /// Plain XOR of the group's padded chunks (`0`).
    Primary,
    /// Positionally weighted mix (`1`).
    Secondary,
    /// Square-weighted mix (`2`).
    Tertiary,
    /// Primary-style parity for a second-phase overlap group (`O{i}`).
    Overlap(u32),
}

impl ParityKind {
    /// Whether the symbol is a plain XOR over its group.
    pub fn is_primary_style(&self) -> bool {
        matches!(self, ParityKind::Primary | ParityKind::Overlap(_))
    }

    fn parse(token: &str) -> Option<Self> {
        match token {
            "0" => Some(ParityKind::Primary),
            "1" => Some(ParityKind::Secondary),
            "2" => Some(ParityKind::Tertiary),
            _ => {
                let index = token.strip_prefix('O')?;
                if index.is_empty() || !index.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                index.parse().ok().map(ParityKind::Overlap)
            }
        }
    }
}

impl fmt::Display for ParityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParityKind::Primary => f.write_str("0"),
            ParityKind::Secondary => f.write_str("1"),
            ParityKind::Tertiary => f.write_str("2"),
            ParityKind::Overlap(i) => write!(f, "O{i}"),
        }
    }
}

/// Canonical parity identifier: chunk range plus kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[must_use]
pub struct ParityId {
    /// First chunk of the covered group (1-based, inclusive).
    pub start: u32,
    /// Last chunk of the covered group (inclusive).
    pub end: u32,
    pub kind: ParityKind,
}

impl ParityId {
    pub const fn new(start: u32, end: u32, kind: ParityKind) -> Self {
        Self { start, end, kind }
    }
}

impl FromStr for ParityId {
    type Err = PacketError;

    /// Parse either wire form, normalising `{start}-{end}` to kind `0`.
    fn from_str(token: &str) -> Result<Self, Self::Err> {
        let invalid = || PacketError::InvalidParityId(token.to_string());

        let mut parts = token.splitn(3, '-');
        let start: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let end: u32 = parts
            .next()
            .and_then(|p| p.parse().ok())
            .ok_or_else(invalid)?;
        let kind = match parts.next() {
            None => ParityKind::Primary,
            Some(tail) => ParityKind::parse(tail).ok_or_else(invalid)?,
        };

        if start == 0 || end < start {
            return Err(invalid());
        }
        Ok(Self { start, end, kind })
    }
}

impl fmt::Display for ParityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}-{}", self.start, self.end, self.kind)
    }
}
