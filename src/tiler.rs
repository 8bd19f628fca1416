//! Token-range tiling
//!
//! The source's token ring is reported as a list of ranges. Tiling assigns
//! every range to exactly one tile so sibling workers never scan the same
//! tokens, then splits each range into bounded closed sub-ranges so no
//! single scan query is unbounded.

use serde::{Deserialize, Serialize};

/// Closed token interval [start, end]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenRange {
    pub start: i64,
    pub end: i64,
}

impl TokenRange {
    pub fn new(start: i64, end: i64) -> Self {
        Self { start, end }
    }

    /// Both endpoints are included
    pub fn contains(&self, token: i64) -> bool {
        token >= self.start && token <= self.end
    }
}

/// Assign token ranges to tiles round-robin by index.
///
/// Stable and reproducible: every worker computes the same assignment from
/// the same range list, so a tile's subset is disjoint from its siblings'.
/// Tiles beyond the range count receive empty lists.
pub fn assign_ranges_to_tiles(ranges: &[TokenRange], tiles: u32) -> Vec<Vec<TokenRange>> {
    debug_assert!(tiles > 0, "tile count must be positive");
    let mut assignments: Vec<Vec<TokenRange>> = vec![Vec::new(); tiles as usize];
    for (i, range) in ranges.iter().enumerate() {
        assignments[i % tiles as usize].push(*range);
    }
    assignments
}

/// Split a closed range into contiguous closed batches of at most
/// `batch_size` tokens (the first batch covers one extra token).
///
/// The batches tile [start, end] exactly: no gaps, no overlaps, final batch
/// clipped to `end`. Batch size must be validated positive by the caller.
pub fn split_range_into_batches(start: i64, end: i64, batch_size: i64) -> Vec<TokenRange> {
    debug_assert!(batch_size > 0, "batch size must be positive");
    let mut batches = Vec::new();
    let mut batch_start = start;
    let mut batch_end = start;
    while batch_start <= end {
        batch_end = batch_end.saturating_add(batch_size).min(end);
        batches.push(TokenRange::new(batch_start, batch_end));
        if batch_end == end {
            break;
        }
        batch_start = batch_end + 1;
    }
    batches
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_zero_to_999_by_100_yields_ten_batches() {
        let batches = split_range_into_batches(0, 999, 100);
        assert_eq!(batches.len(), 10);
        assert_eq!(batches[0], TokenRange::new(0, 100));
        assert_eq!(batches[1], TokenRange::new(101, 200));
        assert_eq!(batches[9], TokenRange::new(901, 999));
    }

    #[test]
    fn test_split_covers_range_without_gaps_or_overlaps() {
        let batches = split_range_into_batches(-500, 777, 64);
        assert_eq!(batches.first().unwrap().start, -500);
        assert_eq!(batches.last().unwrap().end, 777);
        for pair in batches.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn test_split_single_token_range() {
        let batches = split_range_into_batches(42, 42, 100);
        assert_eq!(batches, vec![TokenRange::new(42, 42)]);
    }

    #[test]
    fn test_split_batch_larger_than_range() {
        let batches = split_range_into_batches(0, 10, 1000);
        assert_eq!(batches, vec![TokenRange::new(0, 10)]);
    }

    #[test]
    fn test_split_handles_token_space_edges() {
        let batches = split_range_into_batches(i64::MAX - 10, i64::MAX, 4);
        assert_eq!(batches.first().unwrap().start, i64::MAX - 10);
        assert_eq!(batches.last().unwrap().end, i64::MAX);
        for pair in batches.windows(2) {
            assert_eq!(pair[0].end + 1, pair[1].start);
        }
    }

    #[test]
    fn test_assign_round_robin() {
        let ranges: Vec<TokenRange> = (0..7).map(|i| TokenRange::new(i * 10, i * 10 + 9)).collect();
        let tiles = assign_ranges_to_tiles(&ranges, 3);
        assert_eq!(tiles.len(), 3);
        assert_eq!(tiles[0], vec![ranges[0], ranges[3], ranges[6]]);
        assert_eq!(tiles[1], vec![ranges[1], ranges[4]]);
        assert_eq!(tiles[2], vec![ranges[2], ranges[5]]);
    }

    #[test]
    fn test_assign_is_disjoint_and_complete() {
        let ranges: Vec<TokenRange> = (0..20).map(|i| TokenRange::new(i, i)).collect();
        let tiles = assign_ranges_to_tiles(&ranges, 6);
        let total: usize = tiles.iter().map(|t| t.len()).sum();
        assert_eq!(total, ranges.len());

        let mut seen = std::collections::HashSet::new();
        for tile in &tiles {
            for range in tile {
                assert!(seen.insert(range.start), "range assigned twice");
            }
        }
    }

    #[test]
    fn test_assign_more_tiles_than_ranges() {
        let ranges = vec![TokenRange::new(0, 9), TokenRange::new(10, 19)];
        let tiles = assign_ranges_to_tiles(&ranges, 5);
        assert_eq!(tiles.len(), 5);
        assert_eq!(tiles[0].len(), 1);
        assert_eq!(tiles[1].len(), 1);
        assert!(tiles[2].is_empty());
        assert!(tiles[4].is_empty());
    }

    #[test]
    fn test_assign_is_reproducible() {
        let ranges: Vec<TokenRange> = (0..13).map(|i| TokenRange::new(i * 5, i * 5 + 4)).collect();
        assert_eq!(
            assign_ranges_to_tiles(&ranges, 4),
            assign_ranges_to_tiles(&ranges, 4)
        );
    }

    #[test]
    fn test_contains_is_inclusive() {
        let range = TokenRange::new(-10, 10);
        assert!(range.contains(-10));
        assert!(range.contains(10));
        assert!(range.contains(0));
        assert!(!range.contains(-11));
        assert!(!range.contains(11));
    }
}
