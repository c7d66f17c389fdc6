//! Splits a work list across a fixed number of workers.
//!
//! Worker `i` (0-based) gets `items[i * chunk .. (i + 1) * chunk]`, clamped to the list,
//! where `chunk = ceil(len / total_workers)`. Slices are contiguous, disjoint and keep the
//! source order; trailing workers may get a shorter or empty slice.

use std::ops::Range;

/// Per-worker slice length for a list of `len` items.
///
/// 0 when there are no items or no workers.
pub fn chunk_size(len: usize, total_workers: usize) -> usize {
    if total_workers == 0 || len == 0 {
        0
    } else {
        len.div_ceil(total_workers)
    }
}

/// The slice of `items` that belongs to `worker` (0-based).
pub fn partition<T>(items: &[T], total_workers: usize, worker: usize) -> &[T] {
    &items[worker_range(items.len(), total_workers, worker)]
}

fn worker_range(len: usize, total_workers: usize, worker: usize) -> Range<usize> {
    if worker >= total_workers {
        return 0..0;
    }
    let chunk = chunk_size(len, total_workers);
    let start = worker.saturating_mul(chunk).min(len);
    let end = start.saturating_add(chunk).min(len);
    start..end
}

/// Assignment of index ranges to every worker, computed for one list length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartitionPlan {
    ranges: Vec<Range<usize>>,
}

impl PartitionPlan {
    pub fn new(len: usize, total_workers: usize) -> Self {
        Self {
            ranges: (0..total_workers)
                .map(|w| worker_range(len, total_workers, w))
                .collect(),
        }
    }

    pub fn total_workers(&self) -> usize {
        self.ranges.len()
    }

    /// Index range of `worker`; empty for workers outside the plan.
    pub fn range(&self, worker: usize) -> Range<usize> {
        self.ranges.get(worker).cloned().unwrap_or(0..0)
    }

    /// The slice of `items` that belongs to `worker`.
    ///
    /// `items` must be the list the plan was computed for.
    pub fn slice<'a, T>(&self, items: &'a [T], worker: usize) -> &'a [T] {
        let range = self.range(worker);
        let end = range.end.min(items.len());
        &items[range.start.min(end)..end]
    }

    pub fn slices<'a, T>(&'a self, items: &'a [T]) -> impl Iterator<Item = &'a [T]> + 'a {
        (0..self.ranges.len()).map(move |w| self.slice(items, w))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sizes(len: usize, workers: usize) -> Vec<usize> {
        let items: Vec<usize> = (0..len).collect();
        (0..workers)
            .map(|w| partition(&items, workers, w).len())
            .collect()
    }

    #[test]
    fn ten_items_three_workers() {
        let items: Vec<i64> = (0..10).collect();
        assert_eq!(partition(&items, 3, 0), &[0, 1, 2, 3]);
        assert_eq!(partition(&items, 3, 1), &[4, 5, 6, 7]);
        assert_eq!(partition(&items, 3, 2), &[8, 9]);

        let plan = PartitionPlan::new(10, 3);
        assert_eq!(plan.range(0), 0..4);
        assert_eq!(plan.range(1), 4..8);
        assert_eq!(plan.range(2), 8..10);
    }

    #[test]
    fn union_is_the_whole_list_in_order() {
        for len in 0..40 {
            let items: Vec<usize> = (0..len).collect();
            for workers in 1..12 {
                let plan = PartitionPlan::new(len, workers);
                let joined: Vec<usize> = plan.slices(&items).flatten().copied().collect();
                assert_eq!(joined, items, "len={len} workers={workers}");

                // contiguous ranges never overlap
                for w in 1..workers {
                    assert!(plan.range(w - 1).end <= plan.range(w).start || plan.range(w).is_empty());
                }
            }
        }
    }

    #[test]
    fn single_worker_gets_everything() {
        let items = [7, 8, 9];
        assert_eq!(partition(&items, 1, 0), &items);
    }

    #[test]
    fn empty_list_gives_empty_slices() {
        let items: [i64; 0] = [];
        for workers in 1..5 {
            assert!(sizes(0, workers).iter().all(|s| *s == 0));
            assert!(partition(&items, workers, 0).is_empty());
        }
    }

    #[test]
    fn more_workers_than_items() {
        assert_eq!(sizes(3, 5), vec![1, 1, 1, 0, 0]);
        // chunk = ceil(5/4) = 2, so the last worker is left with nothing
        assert_eq!(sizes(5, 4), vec![2, 2, 1, 0]);
    }

    #[test]
    fn no_workers_or_out_of_range_worker() {
        let items = [1, 2, 3];
        assert_eq!(chunk_size(3, 0), 0);
        assert!(partition(&items, 0, 0).is_empty());
        assert!(partition(&items, 2, 2).is_empty());
        assert_eq!(PartitionPlan::new(3, 0).total_workers(), 0);
        assert!(PartitionPlan::new(3, 2).slice(&items, 5).is_empty());
    }
}
