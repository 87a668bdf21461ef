//! Erasure recovery from parity symbols.
//!
//! Recovery runs to a fixpoint after every stored chunk or parity symbol:
//!
//! 1. Single-missing XOR repairs over the planned groups, repeated until no
//!    group changes. This is exact, and chained overlap groups recover runs
//!    of adjacent losses one chunk at a time.
//! 2. An any-parity pass over every symbol the session actually holds,
//!    keyed purely by the symbol's own id. This catches parity whose group
//!    range is not in the receiver's plan, e.g. after a scheme-token
//!    fallback.
//! 3. Numeric multi-missing solves (2×2, then 3×3 Gaussian elimination in
//!    real arithmetic with byte rounding) on groups carrying weighted
//!    symbols. The mixing is not a field code, so results feed back into
//!    step 1 and are ultimately vetted by the session hash gate.
//!
//! Recovered chunks are stored with trailing zero bytes stripped, undoing
//! the zero padding parity is computed over.

use std::collections::{BTreeMap, HashMap};

use chirplink_core::constants::CHUNK_SIZE;
use chirplink_core::types::{ParityId, ParityKind};

use super::parity::padded;

/// Run recovery to a fixpoint. Returns the sequence numbers recovered,
/// in the order they were repaired.
pub fn run_recovery(
    total: u32,
    plan: &[ParityId],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    parity: &HashMap<ParityId, Vec<u8>>,
) -> Vec<u32> {
    let mut recovered = Vec::new();
    loop {
        if chunks.len() as u32 >= total {
            break;
        }
        if single_missing_pass(total, plan, chunks, parity, &mut recovered) {
            continue;
        }
        if any_parity_pass(total, chunks, parity, &mut recovered) {
            continue;
        }
        if multi_missing_pass(total, plan, chunks, parity, &mut recovered) {
            continue;
        }
        break;
    }
    recovered
}

fn missing_in(range: (u32, u32), chunks: &BTreeMap<u32, Vec<u8>>) -> Vec<u32> {
    (range.0..=range.1)
        .filter(|seq| !chunks.contains_key(seq))
        .collect()
}

fn strip_trailing_zeros(mut bytes: Vec<u8>) -> Vec<u8> {
    while bytes.last() == Some(&0) {
        bytes.pop();
    }
    bytes
}

/// XOR-repair a group with exactly one missing chunk from a primary-style
/// symbol. Exact whenever the symbol matches the group.
fn xor_repair(
    range: (u32, u32),
    symbol: &[u8],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    let missing = missing_in(range, chunks);
    if missing.len() != 1 || symbol.len() != CHUNK_SIZE {
        return false;
    }
    let mut acc: Vec<u8> = symbol.to_vec();
    for seq in range.0..=range.1 {
        if let Some(chunk) = chunks.get(&seq) {
            let chunk = padded(chunk);
            for (a, b) in acc.iter_mut().zip(chunk.iter()) {
                *a ^= b;
            }
        }
    }
    chunks.insert(missing[0], strip_trailing_zeros(acc));
    recovered.push(missing[0]);
    true
}

fn single_missing_pass(
    total: u32,
    plan: &[ParityId],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    parity: &HashMap<ParityId, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    let mut progress = false;
    for id in plan {
        if !id.kind.is_primary_style() || id.end > total {
            continue;
        }
        if let Some(symbol) = parity.get(id) {
            progress |= xor_repair((id.start, id.end), symbol, chunks, recovered);
        }
    }
    progress
}

/// Try every held primary-style symbol against its own declared range,
/// whether or not the plan knows the group.
fn any_parity_pass(
    total: u32,
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    parity: &HashMap<ParityId, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    let mut progress = false;
    for (id, symbol) in parity {
        if !id.kind.is_primary_style() {
            continue;
        }
        let end = id.end.min(total);
        if id.start == 0 || id.start > end {
            continue;
        }
        progress |= xor_repair((id.start, end), symbol, chunks, recovered);
    }
    progress
}

/// Attempt one numeric multi-missing solve; returns after the first repair
/// so the cheaper XOR cascade gets another look at the new state.
fn multi_missing_pass(
    total: u32,
    plan: &[ParityId],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    parity: &HashMap<ParityId, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    for id in plan {
        if id.kind != ParityKind::Primary || id.end > total {
            continue;
        }
        let missing = missing_in((id.start, id.end), chunks);
        let primary = parity.get(id);
        let secondary = parity.get(&ParityId::new(id.start, id.end, ParityKind::Secondary));
        let tertiary = parity.get(&ParityId::new(id.start, id.end, ParityKind::Tertiary));

        let repaired = match (missing.len(), primary, secondary, tertiary) {
            (2, Some(p), Some(s), _) => {
                solve_two((id.start, id.end), &missing, p, s, chunks, recovered)
            }
            (3, Some(p), Some(s), Some(t)) => {
                solve_three((id.start, id.end), &missing, p, s, t, chunks, recovered)
            }
            _ => false,
        };
        if repaired {
            return true;
        }
    }
    false
}

/// Positional weight of `seq` within a group starting at `start`.
fn weight(seq: u32, start: u32) -> u32 {
    seq - start + 1
}

fn round_byte(value: f64) -> u8 {
    (value.round() as i64 & 0xFF) as u8
}

/// Residual of a symbol after XOR-removing the present chunks' weighted
/// contributions: what the missing chunks alone fed into the accumulator.
fn residual(
    range: (u32, u32),
    symbol: &[u8],
    power: u32,
    chunks: &BTreeMap<u32, Vec<u8>>,
) -> Vec<u8> {
    let mut acc = symbol.to_vec();
    acc.resize(CHUNK_SIZE, 0);
    for seq in range.0..=range.1 {
        if let Some(chunk) = chunks.get(&seq) {
            let w = weight(seq, range.0);
            let m = match power {
                0 => 1,
                1 => w,
                _ => w * w,
            };
            let chunk = padded(chunk);
            for (a, &b) in acc.iter_mut().zip(chunk.iter()) {
                *a ^= ((b as u32 * m) & 0xFF) as u8;
            }
        }
    }
    acc
}

/// Two missing chunks, primary plus secondary available: byte-wise 2×2
/// solve in real arithmetic, rounded and masked back to bytes. Solutions
/// are assigned to the missing chunks in ascending seq order.
fn solve_two(
    range: (u32, u32),
    missing: &[u32],
    primary: &[u8],
    secondary: &[u8],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    let w1 = weight(missing[0], range.0) as f64;
    let w2 = weight(missing[1], range.0) as f64;
    if w1 == w2 {
        return false;
    }

    let a = residual(range, primary, 0, chunks);
    let b = residual(range, secondary, 1, chunks);

    let mut first = vec![0u8; CHUNK_SIZE];
    let mut second = vec![0u8; CHUNK_SIZE];
    let det = w2 - w1;
    for j in 0..CHUNK_SIZE {
        let aj = a[j] as f64;
        let bj = b[j] as f64;
        let x2 = (bj - w1 * aj) / det;
        let x1 = aj - x2;
        first[j] = round_byte(x1);
        second[j] = round_byte(x2);
    }

    chunks.insert(missing[0], strip_trailing_zeros(first));
    chunks.insert(missing[1], strip_trailing_zeros(second));
    recovered.extend_from_slice(missing);
    tracing::debug!(
        start = range.0,
        end = range.1,
        ?missing,
        "two-missing numeric repair"
    );
    true
}

/// Three missing chunks with all three symbols: 3×3 Gaussian elimination in
/// real arithmetic. A singular system falls back to the raw symbol bytes.
#[allow(clippy::too_many_arguments)]
fn solve_three(
    range: (u32, u32),
    missing: &[u32],
    primary: &[u8],
    secondary: &[u8],
    tertiary: &[u8],
    chunks: &mut BTreeMap<u32, Vec<u8>>,
    recovered: &mut Vec<u32>,
) -> bool {
    let w: Vec<f64> = missing
        .iter()
        .map(|&seq| weight(seq, range.0) as f64)
        .collect();

    let a = residual(range, primary, 0, chunks);
    let b = residual(range, secondary, 1, chunks);
    let c = residual(range, tertiary, 2, chunks);

    let matrix = [
        [1.0, 1.0, 1.0],
        [w[0], w[1], w[2]],
        [w[0] * w[0], w[1] * w[1], w[2] * w[2]],
    ];

    let mut outputs = vec![vec![0u8; CHUNK_SIZE]; 3];
    for j in 0..CHUNK_SIZE {
        let rhs = [a[j] as f64, b[j] as f64, c[j] as f64];
        match solve_3x3(matrix, rhs) {
            Some(solution) => {
                for (out, &value) in outputs.iter_mut().zip(solution.iter()) {
                    out[j] = round_byte(value);
                }
            }
            None => {
                // Singular system: take the raw symbol bytes as-is.
                outputs[0][j] = primary[j];
                outputs[1][j] = secondary[j];
                outputs[2][j] = tertiary[j];
            }
        }
    }

    for (&seq, bytes) in missing.iter().zip(outputs.into_iter()) {
        chunks.insert(seq, strip_trailing_zeros(bytes));
        recovered.push(seq);
    }
    tracing::debug!(
        start = range.0,
        end = range.1,
        ?missing,
        "three-missing numeric repair"
    );
    true
}

/// Gaussian elimination with partial pivoting; `None` on a singular system.
fn solve_3x3(matrix: [[f64; 3]; 3], rhs: [f64; 3]) -> Option<[f64; 3]> {
    const EPSILON: f64 = 1e-9;

    let mut m = matrix;
    let mut r = rhs;

    for col in 0..3 {
        let pivot_row = (col..3).max_by(|&x, &y| {
            m[x][col]
                .abs()
                .partial_cmp(&m[y][col].abs())
                .unwrap_or(std::cmp::Ordering::Equal)
        })?;
        if m[pivot_row][col].abs() < EPSILON {
            return None;
        }
        m.swap(col, pivot_row);
        r.swap(col, pivot_row);

        for row in (col + 1)..3 {
            let factor = m[row][col] / m[col][col];
            for k in col..3 {
                m[row][k] -= factor * m[col][k];
            }
            r[row] -= factor * r[col];
        }
    }

    let mut x = [0.0; 3];
    for row in (0..3).rev() {
        let mut sum = r[row];
        for k in (row + 1)..3 {
            sum -= m[row][k] * x[k];
        }
        x[row] = sum / m[row][row];
    }
    Some(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fec::{self, parity::build_parity, plan::group_plan};

    /// Build sender-side state for `chunks`, then delete `drop` and verify
    /// recovery restores the exact original bytes.
    fn recover_after_drop(
        chunks: Vec<Vec<u8>>,
        scheme: &fec::FecScheme,
        drop: &[u32],
    ) -> BTreeMap<u32, Vec<u8>> {
        let total = chunks.len() as u32;
        let parity: HashMap<ParityId, Vec<u8>> =
            build_parity(&chunks, scheme).into_iter().collect();
        let plan = group_plan(total, scheme);

        let mut received: BTreeMap<u32, Vec<u8>> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32 + 1, c.clone()))
            .filter(|(seq, _)| !drop.contains(seq))
            .collect();

        run_recovery(total, &plan, &mut received, &parity);
        received
    }

    fn sample_chunks(total: usize, len: usize) -> Vec<Vec<u8>> {
        (0..total)
            .map(|i| {
                (0..len)
                    .map(|j| ((i * 37 + j * 11 + 1) % 251 + 1) as u8)
                    .collect()
            })
            .collect()
    }

    #[test]
    fn one_missing_xor_recovery() {
        let chunks = sample_chunks(4, CHUNK_SIZE);
        let recovered = recover_after_drop(chunks.clone(), &fec::BASIC_4, &[2]);
        assert_eq!(recovered[&2], chunks[1]);
        assert_eq!(recovered.len(), 4);
    }

    #[test]
    fn short_last_chunk_recovers_without_padding() {
        let mut chunks = sample_chunks(4, CHUNK_SIZE);
        chunks[3] = vec![7u8; 10];
        let recovered = recover_after_drop(chunks.clone(), &fec::BASIC_4, &[4]);
        assert_eq!(recovered[&4], chunks[3]);
    }

    #[test]
    fn adjacent_losses_cascade_through_overlap_groups() {
        // Chunks 3 and 4 straddle the (1,3)/(4,6) main group boundary; each
        // is the sole loss of some group, so plain XOR chains repair both.
        let chunks = sample_chunks(8, CHUNK_SIZE);
        let recovered = recover_after_drop(chunks.clone(), &fec::OVERLAPPING_3, &[3, 4]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(&recovered[&(i as u32 + 1)], chunk, "chunk {}", i + 1);
        }
    }

    #[test]
    fn whole_main_group_lost_recovers_via_overlaps() {
        let chunks = sample_chunks(9, CHUNK_SIZE);
        let recovered = recover_after_drop(chunks.clone(), &fec::STRONG_OVERLAPPING_3, &[4, 5, 6]);
        for (i, chunk) in chunks.iter().enumerate() {
            assert_eq!(&recovered[&(i as u32 + 1)], chunk, "chunk {}", i + 1);
        }
    }

    #[test]
    fn two_missing_numeric_solve_on_an_isolated_group() {
        // total = 3 leaves no overlap groups, so the weighted 2×2 path is the
        // only road back. Byte patterns keep the real-arithmetic solve exact.
        let chunks = vec![
            vec![0x01u8; CHUNK_SIZE],
            vec![0x02u8; CHUNK_SIZE],
            vec![0x04u8; CHUNK_SIZE],
        ];
        let recovered = recover_after_drop(chunks.clone(), &fec::STRONG_OVERLAPPING_3, &[1, 2]);
        assert_eq!(recovered[&1], chunks[0]);
        assert_eq!(recovered[&2], chunks[1]);
    }

    #[test]
    fn three_missing_numeric_solve_on_an_isolated_group() {
        let chunks = vec![
            vec![0x01u8; CHUNK_SIZE],
            vec![0x02u8; CHUNK_SIZE],
            vec![0x10u8; CHUNK_SIZE],
        ];
        let recovered = recover_after_drop(chunks.clone(), &fec::STRONG_OVERLAPPING_3, &[1, 2, 3]);
        assert_eq!(recovered[&1], chunks[0]);
        assert_eq!(recovered[&2], chunks[1]);
        assert_eq!(recovered[&3], chunks[2]);
    }

    #[test]
    fn unplanned_parity_is_still_used() {
        // The receiver believes the transfer has no FEC, yet holds a primary
        // symbol for (1,2); the any-parity pass must use it anyway.
        let chunks = sample_chunks(2, CHUNK_SIZE);
        let symbol = compute_symbol(&chunks, 1, 2);

        let mut received: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        received.insert(2, chunks[1].clone());
        let mut parity = HashMap::new();
        parity.insert(ParityId::new(1, 2, ParityKind::Primary), symbol);

        let plan = group_plan(2, &fec::NONE);
        let recovered = run_recovery(2, &plan, &mut received, &parity);
        assert_eq!(recovered, vec![1]);
        assert_eq!(received[&1], chunks[0]);
    }

    #[test]
    fn no_progress_without_enough_parity() {
        let chunks = sample_chunks(4, CHUNK_SIZE);
        let total = chunks.len() as u32;
        let plan = group_plan(total, &fec::BASIC_4);
        // Two losses with only a single XOR symbol: nothing can move.
        let mut received: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        received.insert(1, chunks[0].clone());
        received.insert(4, chunks[3].clone());
        let parity: HashMap<ParityId, Vec<u8>> =
            build_parity(&chunks, &fec::BASIC_4).into_iter().collect();

        let recovered = run_recovery(total, &plan, &mut received, &parity);
        assert!(recovered.is_empty());
        assert_eq!(received.len(), 2);
    }

    #[test]
    fn recovery_is_idempotent() {
        let chunks = sample_chunks(6, CHUNK_SIZE);
        let total = chunks.len() as u32;
        let plan = group_plan(total, &fec::OVERLAPPING_3);
        let parity: HashMap<ParityId, Vec<u8>> = build_parity(&chunks, &fec::OVERLAPPING_3)
            .into_iter()
            .collect();

        let mut received: BTreeMap<u32, Vec<u8>> = chunks
            .iter()
            .enumerate()
            .map(|(i, c)| (i as u32 + 1, c.clone()))
            .filter(|(seq, _)| *seq != 5)
            .collect();

        let first = run_recovery(total, &plan, &mut received, &parity);
        assert_eq!(first, vec![5]);
        let second = run_recovery(total, &plan, &mut received, &parity);
        assert!(second.is_empty());
    }

    #[test]
    fn solve_3x3_rejects_singular() {
        let singular = [[1.0, 1.0, 1.0], [1.0, 1.0, 1.0], [2.0, 2.0, 2.0]];
        assert!(solve_3x3(singular, [1.0, 2.0, 3.0]).is_none());

        let regular = [[1.0, 1.0, 1.0], [1.0, 2.0, 3.0], [1.0, 4.0, 9.0]];
        let x = solve_3x3(regular, [19.0, 53.0, 153.0]).unwrap();
        assert!((x[0] - 1.0).abs() < 1e-6);
        assert!((x[1] - 2.0).abs() < 1e-6);
        assert!((x[2] - 16.0).abs() < 1e-6);
    }

    fn compute_symbol(chunks: &[Vec<u8>], start: u32, end: u32) -> Vec<u8> {
        let group: Vec<&[u8]> = (start..=end)
            .map(|seq| chunks[(seq - 1) as usize].as_slice())
            .collect();
        crate::fec::parity::compute_parity(&group, &ParityKind::Primary)
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        fn seeded_chunks(total: u32, seed: u64) -> Vec<Vec<u8>> {
            let mut state = seed | 1;
            let mut next = move || {
                state = state
                    .wrapping_mul(6364136223846793005)
                    .wrapping_add(1442695040888963407);
                state
            };
            let last_len = (next() % CHUNK_SIZE as u64) as usize + 1;
            (0..total)
                .map(|i| {
                    let len = if i + 1 == total { last_len } else { CHUNK_SIZE };
                    // Bytes stay nonzero so padding remains distinguishable.
                    (0..len).map(|_| (next() % 255) as u8 + 1).collect()
                })
                .collect()
        }

        proptest! {
            #[test]
            fn any_single_loss_recovers(
                total in 1u32..24,
                drop_pick in any::<u32>(),
                seed in any::<u64>(),
                scheme_idx in 0usize..4,
            ) {
                let schemes = [
                    fec::BASIC_2,
                    fec::BASIC_4,
                    fec::OVERLAPPING_3,
                    fec::STRONG_OVERLAPPING_3,
                ];
                let scheme = schemes[scheme_idx];
                let drop_seq = drop_pick % total + 1;

                let chunks = seeded_chunks(total, seed);
                let recovered = recover_after_drop(chunks.clone(), &scheme, &[drop_seq]);

                prop_assert_eq!(recovered.len() as u32, total);
                for (i, chunk) in chunks.iter().enumerate() {
                    prop_assert_eq!(&recovered[&(i as u32 + 1)], chunk);
                }
            }
        }
    }
}
