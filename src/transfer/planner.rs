//! Chunk planning: mode selection and byte-range partitioning

use std::cmp::min;

use super::types::{ChunkPlan, ChunkRange, TransferMode};

/// Parallel transfer needs ranged reads, a known size, and at least one full chunk
pub fn select_mode(total_size: u64, chunk_size: u64, range_capable: bool) -> TransferMode {
    if range_capable && chunk_size > 0 && total_size > 0 && total_size >= chunk_size {
        TransferMode::Parallel
    } else {
        TransferMode::Single
    }
}

/// Split `[0, total_size)` into inclusive ranges of `chunk_size` bytes with
/// 1-based part numbers. The last range is clamped to `total_size - 1`.
pub fn partition(total_size: u64, chunk_size: u64) -> Vec<ChunkRange> {
    if total_size == 0 || chunk_size == 0 {
        return Vec::new();
    }

    let count = total_size.div_ceil(chunk_size) as usize;
    let mut ranges = Vec::with_capacity(count);
    let mut offset = 0u64;
    let mut part_number = 1u32;

    while offset < total_size {
        let end = min(offset.saturating_add(chunk_size - 1), total_size - 1);
        ranges.push(ChunkRange {
            part_number,
            start: offset,
            end,
        });
        offset = end + 1;
        part_number += 1;
    }

    ranges
}

pub fn plan(total_size: u64, chunk_size: u64, range_capable: bool) -> ChunkPlan {
    let mode = select_mode(total_size, chunk_size, range_capable);
    let ranges = match mode {
        TransferMode::Parallel => partition(total_size, chunk_size),
        TransferMode::Single => Vec::new(),
    };

    ChunkPlan {
        mode,
        total_size,
        chunk_size,
        ranges,
    }
}
