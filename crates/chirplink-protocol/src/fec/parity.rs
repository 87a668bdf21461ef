//! Parity symbol generation.
//!
//! Every symbol is computed over the group's chunks right-padded with zero
//! bytes to `CHUNK_SIZE`. The primary (and overlap) symbol is a plain XOR;
//! the secondary and tertiary symbols multiply each byte by the chunk's
//! 1-based positional weight (respectively its square), mask to a byte, and
//! XOR-accumulate. The mixing is wire-visible and must match the peer.

use chirplink_core::constants::CHUNK_SIZE;
use chirplink_core::types::{ParityId, ParityKind};

use super::FecScheme;
use super::plan::group_plan;

/// Right-pad a chunk with zero bytes to `CHUNK_SIZE`.
pub(crate) fn padded(chunk: &[u8]) -> [u8; CHUNK_SIZE] {
    let mut out = [0u8; CHUNK_SIZE];
    out[..chunk.len().min(CHUNK_SIZE)].copy_from_slice(&chunk[..chunk.len().min(CHUNK_SIZE)]);
    out
}

/// Byte multiplier for a chunk at 1-based position `weight` within its group.
fn multiplier(kind: &ParityKind, weight: u32) -> u32 {
    match kind {
        ParityKind::Primary | ParityKind::Overlap(_) => 1,
        ParityKind::Secondary => weight,
        ParityKind::Tertiary => weight * weight,
    }
}

/// Compute one parity symbol over a group's chunks in ascending seq order.
pub fn compute_parity(group: &[&[u8]], kind: &ParityKind) -> Vec<u8> {
    let mut acc = vec![0u8; CHUNK_SIZE];
    for (offset, chunk) in group.iter().enumerate() {
        let m = multiplier(kind, offset as u32 + 1);
        let chunk = padded(chunk);
        for (a, &byte) in acc.iter_mut().zip(chunk.iter()) {
            *a ^= ((byte as u32 * m) & 0xFF) as u8;
        }
    }
    acc
}

/// Compute all parity symbols for an outgoing message, in plan order.
///
/// `chunks[i]` holds the chunk with `seq == i + 1`.
pub fn build_parity(chunks: &[Vec<u8>], scheme: &FecScheme) -> Vec<(ParityId, Vec<u8>)> {
    let total = chunks.len() as u32;
    group_plan(total, scheme)
        .into_iter()
        .map(|id| {
            let group: Vec<&[u8]> = (id.start..=id.end)
                .map(|seq| chunks[(seq - 1) as usize].as_slice())
                .collect();
            let symbol = compute_parity(&group, &id.kind);
            (id, symbol)
        })
        .collect()
}
