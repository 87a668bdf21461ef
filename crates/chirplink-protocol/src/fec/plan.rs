//! Deterministic FEC group layout.
//!
//! The plan is a pure function of `(total, scheme)`. The sender emits parity
//! in plan order and the receiver re-derives the identical sequence, so the
//! enumeration below is wire-visible and must not change.

use std::collections::HashSet;

use chirplink_core::types::{ParityId, ParityKind};

use super::FecScheme;

/// Enumerate the parity symbols for a transfer of `total` chunks.
pub fn group_plan(total: u32, scheme: &FecScheme) -> Vec<ParityId> {
    if scheme.is_none() || total == 0 {
        return Vec::new();
    }
    if scheme.overlap {
        overlapping_plan(total, scheme.parity_count)
    } else {
        strided_plan(total, scheme)
    }
}

fn kind_for(index: u8) -> ParityKind {
    match index {
        0 => ParityKind::Primary,
        1 => ParityKind::Secondary,
        _ => ParityKind::Tertiary,
    }
}

/// Non-overlapping layout: groups stride by `group_size`, each carrying
/// `parity_count` symbols in kind order.
fn strided_plan(total: u32, scheme: &FecScheme) -> Vec<ParityId> {
    let mut out = Vec::new();
    let mut i = 0;
    while i < total {
        let start = i + 1;
        let end = (i + scheme.group_size).min(total);
        for p in 0..scheme.parity_count.min(3) {
            out.push(ParityId::new(start, end, kind_for(p)));
        }
        i += scheme.group_size;
    }
    out
}

/// Two-phase overlapping layout.
///
/// Phase one walks main groups at stride 3; phase two walks every candidate
/// `(i, i+2)` window and emits those not already covered. The overlap index
/// advances on every candidate, emitted or skipped, so receivers derive the
/// same `O{i}` ids by repeating the walk.
fn overlapping_plan(total: u32, parity_count: u8) -> Vec<ParityId> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();

    let mut start = 1;
    while start <= total {
        let end = (start + 2).min(total);
        seen.insert((start, end));
        for p in 0..parity_count.min(3) {
            out.push(ParityId::new(start, end, kind_for(p)));
        }
        start += 3;
    }

    let mut o_index = 0;
    let mut i = 2;
    while i + 2 <= total {
        let (start, end) = (i, i + 2);
        if !seen.contains(&(start, end)) {
            out.push(ParityId::new(start, end, ParityKind::Overlap(o_index)));
        }
        o_index += 1;
        i += 1;
    }

    out
}
