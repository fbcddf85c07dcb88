//! Two-pass parallel bucketing into contiguous per-group storage.
//!
//! [`ParallelGroupBuilder`] assigns variable-length groups of records
//! (rows when building CSR, columns when building CSC) into contiguous
//! slots of a flat array, filled by many workers without per-record
//! locking. One full counting pass learns every group's size, a prefix sum
//! fixes disjoint output ranges, and a second pass places records into
//! ranges no other worker touches. The only synchronization points are the
//! ends of the two passes.
//!
//! # Protocol
//!
//! 1. [`init_budget`](ParallelGroupBuilder::init_budget) allocates the
//!    per-thread-per-group counter table.
//! 2. Pass 1: each worker counts its records through its own
//!    [`BudgetTally`] (or via the sequential
//!    [`add_budget`](ParallelGroupBuilder::add_budget)).
//! 3. [`init_storage`](ParallelGroupBuilder::init_storage) turns counts
//!    into a prefix sum appended onto `offset`, resizes `data`, and
//!    derives every worker's write cursors. Called exactly once.
//! 4. Pass 2: each worker places its records through its own
//!    [`GroupWriter`] (or via the sequential
//!    [`push`](ParallelGroupBuilder::push)), re-walking the same records
//!    in the same order it counted them.
//!
//! A worker must never place more records into a group than it budgeted,
//! and must keep the same worker/group pairing in both passes. That is the
//! load-bearing invariant: it gives every worker a disjoint, pre-computed
//! output range within every group.

use std::marker::PhantomData;

/// Builds groups of records into `offset`/`data` with a two-pass
/// count-then-place scheme.
///
/// Borrows the target arrays for the duration of the build: new group
/// offsets continue from `offset`'s current back, new records land after
/// `data`'s current end, so a builder can extend a non-empty page.
///
/// Group keys are absolute; keys below `base_row_offset` belong to rows
/// that already exist in the target and are rejected.
#[derive(Debug)]
pub struct ParallelGroupBuilder<'a, T> {
    offset: &'a mut Vec<u64>,
    data: &'a mut Vec<T>,
    base_row_offset: usize,
    /// Per-thread-per-group counts during pass 1; rewritten in place into
    /// absolute write cursors by `init_storage`.
    slots: Vec<Vec<usize>>,
}

impl<'a, T: Copy + Default> ParallelGroupBuilder<'a, T> {
    pub fn new(offset: &'a mut Vec<u64>, data: &'a mut Vec<T>) -> Self {
        Self::with_base_row_offset(offset, data, 0)
    }

    /// Create a builder that resumes after `base_row_offset` existing groups.
    pub fn with_base_row_offset(
        offset: &'a mut Vec<u64>,
        data: &'a mut Vec<T>,
        base_row_offset: usize,
    ) -> Self {
        Self {
            offset,
            data,
            base_row_offset,
            slots: Vec::new(),
        }
    }

    /// Allocate the zero-initialized per-thread budget table.
    ///
    /// `num_groups_hint` pre-sizes each thread's counter row; rows grow on
    /// demand when a larger key is budgeted. Must be called before any
    /// budgeting.
    pub fn init_budget(&mut self, num_groups_hint: usize, n_threads: usize) {
        let hint = num_groups_hint.saturating_sub(self.base_row_offset);
        self.slots = vec![vec![0; hint]; n_threads.max(1)];
    }

    /// Count one record for `(key, tid)` during pass 1.
    #[inline]
    pub fn add_budget(&mut self, key: usize, tid: usize) {
        let base = self.base_row_offset;
        tally_into(&mut self.slots[tid], base, key);
    }

    /// Hand out one pass-1 counting handle per thread slot.
    ///
    /// The handle index is the thread id: give each parallel worker the
    /// handle matching the slice it scans, and reuse the same pairing for
    /// [`writers`](Self::writers) in pass 2.
    pub fn budget_tallies(&mut self) -> Vec<BudgetTally<'_>> {
        let base = self.base_row_offset;
        self.slots
            .iter_mut()
            .map(|counts| BudgetTally { counts, base })
            .collect()
    }

    /// Fix the output layout from the pass-1 counts.
    ///
    /// Appends one prefix-sum offset per group onto `offset` (continuing
    /// from its current back), resizes `data` to the new total, and turns
    /// every `(thread, group)` count into that thread's absolute write
    /// cursor: group base plus the counts of all lower-numbered threads.
    /// Must be called exactly once, between the passes.
    pub fn init_storage(&mut self) {
        let num_groups = self.slots.iter().map(Vec::len).max().unwrap_or(0);
        for row in &mut self.slots {
            row.resize(num_groups, 0);
        }

        if self.offset.is_empty() {
            self.offset.push(0);
        }
        assert_eq!(
            self.offset.len(),
            self.base_row_offset + 1,
            "builder must resume at the end of the target page"
        );

        let mut start = *self.offset.last().expect("offset holds a leading zero") as usize;
        debug_assert_eq!(start, self.data.len(), "offset/data length mismatch");
        for g in 0..num_groups {
            for row in &mut self.slots {
                let count = row[g];
                row[g] = start;
                start += count;
            }
            self.offset.push(start as u64);
        }
        self.data.resize(start, T::default());
    }

    /// Place one record for `(key, tid)` during pass 2.
    #[inline]
    pub fn push(&mut self, key: usize, value: T, tid: usize) {
        let k = key
            .checked_sub(self.base_row_offset)
            .expect("group key below the builder base");
        let at = self.slots[tid][k];
        self.data[at] = value;
        self.slots[tid][k] = at + 1;
    }

    /// Hand out one pass-2 placement handle per thread slot.
    ///
    /// Handles may be moved to different threads; their write ranges are
    /// disjoint by construction of [`init_storage`](Self::init_storage).
    pub fn writers(&mut self) -> Vec<GroupWriter<'_, T>> {
        let ptr = self.data.as_mut_ptr();
        let len = self.data.len();
        let base = self.base_row_offset;
        self.slots
            .iter_mut()
            .map(|cursors| GroupWriter {
                ptr,
                len,
                cursors,
                base,
                _marker: PhantomData,
            })
            .collect()
    }
}

#[inline]
fn tally_into(counts: &mut Vec<usize>, base: usize, key: usize) {
    assert!(
        key >= base,
        "group {} is below the builder base {}",
        key,
        base
    );
    let k = key - base;
    if counts.len() <= k {
        counts.resize(k + 1, 0);
    }
    counts[k] += 1;
}

/// Pass-1 counting handle for a single thread slot.
#[derive(Debug)]
pub struct BudgetTally<'a> {
    counts: &'a mut Vec<usize>,
    base: usize,
}

impl BudgetTally<'_> {
    /// Count one record that will later be placed into group `key`.
    #[inline]
    pub fn add(&mut self, key: usize) {
        tally_into(self.counts, self.base, key);
    }
}

/// Pass-2 placement handle for a single thread slot.
///
/// Writes through a raw pointer into the shared `data` array. Each push
/// lands at this thread's cursor for the record's group and advances it by
/// one; no bounds are re-checked beyond what `init_storage` guaranteed.
#[derive(Debug)]
pub struct GroupWriter<'a, T> {
    ptr: *mut T,
    len: usize,
    cursors: &'a mut Vec<usize>,
    base: usize,
    _marker: PhantomData<&'a mut [T]>,
}

// Safety: every writer owns a private cursor row, and init_storage derives
// cursor ranges that are pairwise disjoint across (thread, group) pairs, so
// concurrent writers never alias a data slot.
unsafe impl<T: Send> Send for GroupWriter<'_, T> {}

impl<T: Copy> GroupWriter<'_, T> {
    /// Place one record into group `key` at this thread's cursor.
    #[inline]
    pub fn push(&mut self, key: usize, value: T) {
        debug_assert!(key >= self.base, "group key below the builder base");
        let k = key - self.base;
        let at = self.cursors[k];
        debug_assert!(at < self.len, "push past the budget counted in pass 1");
        // Safety: `at` lies inside this writer's disjoint range for group
        // `k` (see the Send impl); T is Copy so no drop is skipped.
        unsafe { self.ptr.add(at).write(value) };
        self.cursors[k] = at + 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sequential_two_pass_build() {
        let mut offset = Vec::new();
        let mut data: Vec<u32> = Vec::new();
        let mut builder = ParallelGroupBuilder::new(&mut offset, &mut data);
        builder.init_budget(3, 1);

        // records: group 0 gets 10, group 2 gets 20 and 21, group 1 empty
        builder.add_budget(0, 0);
        builder.add_budget(2, 0);
        builder.add_budget(2, 0);
        builder.init_storage();
        builder.push(0, 10, 0);
        builder.push(2, 20, 0);
        builder.push(2, 21, 0);

        assert_eq!(offset, vec![0, 1, 1, 3]);
        assert_eq!(data, vec![10, 20, 21]);
    }

    #[test]
    fn test_threads_interleave_by_thread_id() {
        let mut offset = Vec::new();
        let mut data: Vec<u32> = Vec::new();
        let mut builder = ParallelGroupBuilder::new(&mut offset, &mut data);
        builder.init_budget(2, 2);

        // both threads contribute to group 0; thread 1 also fills group 1
        {
            let mut tallies = builder.budget_tallies();
            tallies[0].add(0);
            tallies[1].add(0);
            tallies[1].add(1);
        }
        builder.init_storage();
        {
            let mut writers = builder.writers();
            // place in reverse thread order to prove ranges are fixed
            writers[1].push(0, 100);
            writers[1].push(1, 101);
            writers[0].push(0, 0);
        }

        assert_eq!(offset, vec![0, 2, 3]);
        // within group 0, thread 0's record precedes thread 1's
        assert_eq!(data, vec![0, 100, 101]);
    }

    #[test]
    fn test_resumes_into_non_empty_target() {
        let mut offset = vec![0, 2];
        let mut data: Vec<u32> = vec![7, 8];
        let mut builder = ParallelGroupBuilder::with_base_row_offset(&mut offset, &mut data, 1);
        builder.init_budget(2, 1);
        builder.add_budget(1, 0);
        builder.add_budget(2, 0);
        builder.init_storage();
        builder.push(1, 9, 0);
        builder.push(2, 10, 0);

        assert_eq!(offset, vec![0, 2, 3, 4]);
        assert_eq!(data, vec![7, 8, 9, 10]);
    }

    #[test]
    fn test_budget_rows_grow_past_hint() {
        let mut offset = Vec::new();
        let mut data: Vec<u32> = Vec::new();
        let mut builder = ParallelGroupBuilder::new(&mut offset, &mut data);
        builder.init_budget(1, 2);
        builder.add_budget(4, 1);
        builder.init_storage();
        builder.push(4, 42, 1);

        assert_eq!(offset, vec![0, 0, 0, 0, 0, 1]);
        assert_eq!(data, vec![42]);
    }

    #[test]
    #[should_panic(expected = "below the builder base")]
    fn test_budget_below_base_rejected() {
        let mut offset = vec![0, 1];
        let mut data: Vec<u32> = vec![7];
        let mut builder = ParallelGroupBuilder::with_base_row_offset(&mut offset, &mut data, 1);
        builder.init_budget(2, 1);
        builder.add_budget(0, 0);
    }
}
