//! Deterministic utilities for reproducible splits
//!
//! Row order after shuffling depends only on the row contents, the row's
//! original position and the seed, so identical inputs yield identical
//! train/test splits and folds on every platform.

use lumen_segment_core::table::Row;

/// Deterministic xxhash64-like hash in pure i64 arithmetic
/// Simplified version for row ordering
pub fn xxhash64_i64(data: &[i64], seed: i64) -> i64 {
    const PRIME1: i64 = 0x9E3779B185EBCA87_u64 as i64;
    const PRIME2: i64 = 0xC2B2AE3D27D4EB4F_u64 as i64;
    const PRIME3: i64 = 0x165667B19E3779F9_u64 as i64;
    const PRIME5: i64 = 0x85EBCA77C2B2AE63_u64 as i64;

    let mut h = seed.wrapping_add(PRIME5);

    for &val in data {
        h = h.wrapping_add(val.wrapping_mul(PRIME3));
        h = h.rotate_left(17).wrapping_mul(PRIME2);
    }

    h ^= h >> 33;
    h = h.wrapping_mul(PRIME1);
    h ^= h >> 29;
    h = h.wrapping_mul(PRIME2);
    h ^= h >> 32;

    h
}

/// Integer fingerprint of a row: position, target bits, then value bytes
pub fn row_fingerprint(position: usize, row: &Row) -> Vec<i64> {
    let mut data = vec![position as i64, row.target.to_bits() as i64];
    for value in &row.values {
        match value.as_str() {
            Some(text) => {
                data.extend(text.bytes().map(i64::from));
                data.push(-1);
            }
            None => data.push(-2),
        }
    }
    data
}

/// Row positions ordered by seeded hash
pub fn shuffled_positions(rows: &[Row], seed: i64) -> Vec<usize> {
    let mut keyed: Vec<(i64, usize)> = rows
        .iter()
        .enumerate()
        .map(|(i, row)| (xxhash64_i64(&row_fingerprint(i, row), seed), i))
        .collect();
    keyed.sort_unstable();
    keyed.into_iter().map(|(_, i)| i).collect()
}

/// `[start, end)` ranges of `k` contiguous folds over `len` rows
///
/// The first `len % k` folds hold one extra row.
pub fn fold_ranges(len: usize, k: usize) -> Vec<(usize, usize)> {
    if k == 0 {
        return Vec::new();
    }
    let base = len / k;
    let extra = len % k;
    let mut start = 0;
    (0..k)
        .map(|fold| {
            let size = base + usize::from(fold < extra);
            let range = (start, start + size);
            start += size;
            range
        })
        .collect()
}
