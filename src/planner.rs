use std::path::PathBuf;

use crate::state::Segment;

/// Splits `total_size` bytes into `requested` contiguous inclusive ranges.
///
/// Every segment but the last is `total_size / n` bytes long; the last one
/// runs to `total_size - 1` and absorbs the remainder. `n` is clamped to
/// `total_size` so no segment is empty, and a zero-length resource yields no
/// segments at all.
pub fn plan_segments<F>(total_size: u64, requested: usize, part_path: F) -> Vec<Segment>
where
    F: Fn(usize) -> PathBuf,
{
    let split_count = (requested.max(1) as u64).min(total_size);
    if split_count == 0 {
        return Vec::new();
    }

    let part_size = total_size / split_count;
    let mut segments = Vec::with_capacity(split_count as usize);

    for i in 0..split_count {
        let start = i * part_size;
        let end = if i == split_count - 1 {
            total_size - 1
        } else {
            (i + 1) * part_size - 1
        };

        segments.push(Segment {
            index: i as usize,
            start,
            end,
            part_path: part_path(i as usize),
        });
    }

    segments
}
