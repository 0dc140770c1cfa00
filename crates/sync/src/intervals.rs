//! A set of disjoint, inclusive block-number ranges.

use std::collections::BTreeMap;

/// Disjoint `[lo, hi]` ranges ordered by `lo`. Adjacent ranges coalesce
/// on insertion, so the map always holds the minimal representation.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BlockRangeSet {
    ranges: BTreeMap<u64, u64>,
}

impl BlockRangeSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the set holds no block numbers.
    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }

    /// Total count of block numbers in the set.
    pub fn total(&self) -> u64 {
        self.ranges.iter().map(|(lo, hi)| hi - lo + 1).sum()
    }

    /// Whether `number` is in the set.
    pub fn contains(&self, number: u64) -> bool {
        self.ranges
            .range(..=number)
            .next_back()
            .is_some_and(|(_, &hi)| number <= hi)
    }

    /// The ranges in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u64, u64)> + '_ {
        self.ranges.iter().map(|(&lo, &hi)| (lo, hi))
    }

    /// The highest block number in the set.
    pub fn highest(&self) -> Option<u64> {
        self.ranges.values().next_back().copied()
    }

    /// Inserts `[lo, hi]`, coalescing with overlapping or adjacent
    /// ranges.
    pub fn add(&mut self, lo: u64, hi: u64) {
        if lo > hi {
            return;
        }
        let (mut lo, mut hi) = (lo, hi);
        let mut absorbed = Vec::new();
        for (&rlo, &rhi) in self.ranges.range(..=hi.saturating_add(1)).rev() {
            if rhi.saturating_add(1) < lo {
                break;
            }
            absorbed.push(rlo);
        }
        for rlo in absorbed {
            let rhi = self.ranges.remove(&rlo).expect("collected above");
            lo = lo.min(rlo);
            hi = hi.max(rhi);
        }
        self.ranges.insert(lo, hi);
    }

    /// Removes `[lo, hi]`, splitting any range that straddles a
    /// boundary.
    pub fn remove(&mut self, lo: u64, hi: u64) {
        if lo > hi {
            return;
        }
        let mut touched = Vec::new();
        for (&rlo, &rhi) in self.ranges.range(..=hi).rev() {
            if rhi < lo {
                break;
            }
            touched.push((rlo, rhi));
        }
        for (rlo, rhi) in touched {
            self.ranges.remove(&rlo);
            if rlo < lo {
                self.ranges.insert(rlo, lo - 1);
            }
            if rhi > hi {
                self.ranges.insert(hi + 1, rhi);
            }
        }
    }

    /// Carves off up to `max` block numbers from the top of the set.
    pub fn reserve_top(&mut self, max: u64) -> Option<(u64, u64)> {
        if max == 0 {
            return None;
        }
        let (&lo, &hi) = self.ranges.iter().next_back()?;
        let take_lo = if hi - lo + 1 > max { hi - max + 1 } else { lo };
        self.remove(take_lo, hi);
        Some((take_lo, hi))
    }

    /// Drops every range.
    pub fn clear(&mut self) {
        self.ranges.clear();
    }
}
