//! The canonical CSR page and its transformation operations.
//!
//! [`SparsePage`] owns two parallel arrays: a row-offset prefix sum and a
//! flat entry array. Pages are chunks of a larger matrix; `base_rowid` is
//! the global row index of local row 0.
//!
//! Pages are created empty, grown by appending adapter batches
//! ([`push_batch`](SparsePage::push_batch)) or other pages
//! ([`push`](SparsePage::push), [`push_csc`](SparsePage::push_csc)), and
//! reshaped with [`get_transpose`](SparsePage::get_transpose),
//! [`sort_indices`](SparsePage::sort_indices) and friends. No two
//! operations may mutate the same page concurrently; each call owns the
//! page for its duration.
//!
//! # Example
//!
//! ```
//! use ndarray::array;
//! use sparse_page::{DenseAdapter, SparsePage};
//!
//! let values = array![[1.0, 0.0], [0.0, 2.0]];
//! let mut page = SparsePage::new();
//! let n_columns = page
//!     .push_batch(&DenseAdapter::new(values.view()), 0.0, 1)
//!     .unwrap();
//!
//! assert_eq!(n_columns, 2);
//! assert_eq!(page.offsets(), &[0, 1, 2]);
//! ```

use serde::{Deserialize, Serialize};

use crate::adapter::{AdapterBatch, BatchLine};
use crate::entry::Entry;
use crate::group_builder::ParallelGroupBuilder;
use crate::utils::{partition_ranges, resolve_n_threads, run_with_threads};
use crate::validity::IsValid;

/// Ingestion failure on malformed input data.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PageError {
    /// An infinite value was seen while the missing sentinel is not `inf`.
    #[error(
        "input data contains `inf` or a value too large, \
         while `missing` is not set to `inf` (missing: {missing})"
    )]
    InfInData { missing: f32 },
}

/// One CSR chunk of a sparse matrix.
///
/// Invariants, upheld after every mutating operation:
/// - `offset` is non-empty, starts at 0 and is non-decreasing;
/// - `offset.len()` equals the local row count plus one;
/// - `data.len()` equals `offset.last()`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparsePage {
    offset: Vec<u64>,
    data: Vec<Entry>,
    base_rowid: u64,
}

impl Default for SparsePage {
    fn default() -> Self {
        Self::new()
    }
}

impl SparsePage {
    /// Create an empty page: one leading zero offset, no entries.
    pub fn new() -> Self {
        Self {
            offset: vec![0],
            data: Vec::new(),
            base_rowid: 0,
        }
    }

    /// Assemble a page from raw CSR arrays.
    ///
    /// # Panics
    /// Panics if the arrays violate the page invariants.
    pub fn from_parts(offset: Vec<u64>, data: Vec<Entry>, base_rowid: u64) -> Self {
        assert!(!offset.is_empty(), "offset must hold a leading zero");
        assert_eq!(offset[0], 0, "offset must start at 0");
        assert!(
            offset.windows(2).all(|w| w[0] <= w[1]),
            "offset must be non-decreasing"
        );
        assert_eq!(
            data.len() as u64,
            *offset.last().expect("checked non-empty"),
            "offset/data length mismatch"
        );
        Self {
            offset,
            data,
            base_rowid,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Number of local rows.
    #[inline]
    pub fn size(&self) -> usize {
        self.offset.len() - 1
    }

    /// Global row index of local row 0.
    #[inline]
    pub fn base_rowid(&self) -> u64 {
        self.base_rowid
    }

    #[inline]
    pub fn set_base_rowid(&mut self, base_rowid: u64) {
        self.base_rowid = base_rowid;
    }

    /// Row-start positions into [`entries`](Self::entries);
    /// length = row count + 1, first element 0.
    #[inline]
    pub fn offsets(&self) -> &[u64] {
        &self.offset
    }

    /// All entries, laid out contiguously in row order.
    #[inline]
    pub fn entries(&self) -> &[Entry] {
        &self.data
    }

    /// The entry slice of local row `i`.
    #[inline]
    pub fn row(&self, i: usize) -> &[Entry] {
        &self.data[self.offset[i] as usize..self.offset[i + 1] as usize]
    }

    /// In-memory cost of the page, used for cache accounting.
    pub fn mem_cost_bytes(&self) -> usize {
        std::mem::size_of_val(self.offset.as_slice()) + std::mem::size_of_val(self.data.as_slice())
    }

    #[inline]
    fn debug_check(&self) {
        debug_assert_eq!(
            self.offset.last().copied(),
            Some(self.data.len() as u64),
            "offset/data length mismatch"
        );
    }

    // =========================================================================
    // Append From Adapter Batch
    // =========================================================================

    /// Append an adapter batch, filtering by the `missing` sentinel.
    ///
    /// Runs the two-pass group build over `n_threads` static slices of the
    /// batch: pass 1 counts valid elements per (thread, row) and tracks the
    /// maximum column index seen (valid or not); pass 2 places the entries.
    /// Column-major batches are forced to a single thread, since threading
    /// them would take scratch memory proportional to threads times rows.
    ///
    /// Returns the column count contributed by this batch, i.e. the maximum
    /// column index seen plus one. An empty batch returns 0 and leaves the
    /// page untouched.
    ///
    /// # Errors
    /// [`PageError::InfInData`] if any value is infinite while `missing` is
    /// not. Detection happens inside pass 1 but is reported only after the
    /// whole pass finishes, so the error reflects a fully scanned batch;
    /// the page's offsets and entries are left unchanged.
    ///
    /// # Panics
    /// Panics if a tuple's row index, less the page's `base_rowid`, falls
    /// below the rows already present: batches only ever extend a page.
    pub fn push_batch<B: AdapterBatch>(
        &mut self,
        batch: &B,
        missing: f32,
        n_threads: usize,
    ) -> Result<u64, PageError> {
        let batch_size = batch.size();
        if batch_size == 0 {
            return Ok(0);
        }

        let n_slices = if B::IS_ROW_MAJOR {
            resolve_n_threads(n_threads)
        } else {
            1
        };
        let n_threads = if B::IS_ROW_MAJOR { n_threads } else { 1 };

        // One group per line for row-major input; column-major input infers
        // a row-count hint from the last element of the last line. Either
        // way the budget table grows on demand.
        let expected_rows = if B::IS_ROW_MAJOR {
            batch_size
        } else {
            let last_line = batch.line(batch_size - 1);
            if last_line.size() > 0 {
                let last = last_line.get_element(last_line.size() - 1);
                last.row_idx.saturating_sub(self.base_rowid) as usize
            } else {
                0
            }
        };

        let base_rowid = self.base_rowid;
        let builder_base = self.size();
        let ranges = partition_ranges(batch_size, n_slices);
        let is_valid = IsValid::new(missing);

        let mut builder =
            ParallelGroupBuilder::with_base_row_offset(&mut self.offset, &mut self.data, builder_base);
        builder.init_budget(builder_base + expected_rows, n_slices);

        let (max_columns, valid) = run_with_threads(n_threads, |parallelism| {
            // Pass 1: budget counting. Admissibility violations are only
            // recorded here and surfaced after the barrier.
            let work: Vec<_> = ranges.iter().cloned().zip(builder.budget_tallies()).collect();
            let scans = parallelism.maybe_par_map(work, |(range, mut tally)| {
                let mut max_columns = 0u64;
                let mut valid = true;
                for i in range {
                    let line = batch.line(i);
                    for j in 0..line.size() {
                        let element = line.get_element(j);
                        assert!(
                            element.row_idx >= base_rowid,
                            "adapter row {} is below the page base row {}",
                            element.row_idx,
                            base_rowid
                        );
                        if !is_valid.is_admissible(element.value) {
                            valid = false;
                        }
                        max_columns = max_columns.max(element.column_idx + 1);
                        if is_valid.is_valid(element.value) {
                            tally.add((element.row_idx - base_rowid) as usize);
                        }
                    }
                }
                (max_columns, valid)
            });

            let max_columns = scans.iter().map(|s| s.0).max().unwrap_or(0);
            let valid = scans.iter().all(|s| s.1);
            if !valid {
                return (max_columns, false);
            }

            builder.init_storage();

            // Pass 2: placement over the same slices, same thread pairing.
            let work: Vec<_> = ranges.iter().cloned().zip(builder.writers()).collect();
            parallelism.maybe_par_for_each(work, |(range, mut writer)| {
                for i in range {
                    let line = batch.line(i);
                    for j in 0..line.size() {
                        let element = line.get_element(j);
                        if is_valid.is_valid(element.value) {
                            writer.push(
                                (element.row_idx - base_rowid) as usize,
                                Entry::new(element.column_idx as u32, element.value),
                            );
                        }
                    }
                }
            });

            (max_columns, true)
        });

        if !valid {
            return Err(PageError::InfInData { missing });
        }
        self.debug_check();
        Ok(max_columns)
    }

    // =========================================================================
    // Append From Page
    // =========================================================================

    /// Append another page's rows after this page's rows.
    ///
    /// The other page is already canonical, so entries are copied without
    /// filtering and its offsets are rebased onto this page's tail.
    pub fn push(&mut self, other: &SparsePage) {
        let top = *self.offset.last().expect("offset holds a leading zero");
        self.data.extend_from_slice(&other.data);
        self.offset
            .extend(other.offset[1..].iter().map(|&o| top + o));
        self.debug_check();
    }

    // =========================================================================
    // Transpose
    // =========================================================================

    /// Build the CSC counterpart of this CSR page.
    ///
    /// The result is a new page with `num_columns` rows, each holding the
    /// entries of one original column as `(original_row_index, value)`,
    /// rows in ascending order within each column. A page with no entries
    /// transposes to an explicitly empty but well-shaped page with
    /// `num_columns + 1` zero offsets.
    ///
    /// # Panics
    /// Panics if an entry references a column at or past `num_columns`.
    pub fn get_transpose(&self, num_columns: usize, n_threads: usize) -> SparsePage {
        let mut transpose = SparsePage::new();
        let num_rows = self.size();
        let n_slices = resolve_n_threads(n_threads);
        let ranges = partition_ranges(num_rows, n_slices);
        let base_rowid = self.base_rowid;

        let mut builder = ParallelGroupBuilder::new(&mut transpose.offset, &mut transpose.data);
        builder.init_budget(num_columns, n_slices);

        run_with_threads(n_threads, |parallelism| {
            let work: Vec<_> = ranges.iter().cloned().zip(builder.budget_tallies()).collect();
            parallelism.maybe_par_for_each(work, |(range, mut tally)| {
                for i in range {
                    for entry in self.row(i) {
                        tally.add(entry.index as usize);
                    }
                }
            });

            builder.init_storage();

            let work: Vec<_> = ranges.iter().cloned().zip(builder.writers()).collect();
            parallelism.maybe_par_for_each(work, |(range, mut writer)| {
                for i in range {
                    let row_id = (base_rowid + i as u64) as u32;
                    for entry in self.row(i) {
                        writer.push(entry.index as usize, Entry::new(row_id, entry.fvalue));
                    }
                }
            });
        });

        if transpose.data.is_empty() {
            // No entries anywhere: still produce the full column shape.
            transpose.offset.clear();
            transpose.offset.resize(num_columns + 1, 0);
        }
        assert_eq!(
            transpose.offset.len(),
            num_columns + 1,
            "entry column index out of range for num_columns = {}",
            num_columns
        );
        transpose.debug_check();
        transpose
    }

    // =========================================================================
    // Sort, Reindex
    // =========================================================================

    /// Sort every row's entries by column index, rows in parallel.
    pub fn sort_indices(&mut self, n_threads: usize) {
        let rows = self.rows_mut();
        run_with_threads(n_threads, |parallelism| {
            parallelism.maybe_par_for_each(rows, |row| row.sort_unstable_by(Entry::cmp_index));
        });
    }

    /// Check that every row is sorted ascending by column index.
    ///
    /// Each worker counts the sorted rows in its slice; the page is sorted
    /// iff the counts sum to the row count, so one unsorted row anywhere
    /// flips the result.
    pub fn is_indices_sorted(&self, n_threads: usize) -> bool {
        let num_rows = self.size();
        let n_slices = resolve_n_threads(n_threads).min(num_rows).max(1);
        let ranges = partition_ranges(num_rows, n_slices);
        run_with_threads(n_threads, |parallelism| {
            let sorted_rows = parallelism.maybe_par_map(ranges, |range| {
                range
                    .filter(|&i| self.row(i).windows(2).all(|w| w[0].index <= w[1].index))
                    .count()
            });
            sorted_rows.into_iter().sum::<usize>() == num_rows
        })
    }

    /// Sort every row's entries by value, rows in parallel.
    pub fn sort_rows(&mut self, n_threads: usize) {
        let rows = self.rows_mut();
        run_with_threads(n_threads, |parallelism| {
            parallelism.maybe_par_for_each(rows, |row| row.sort_unstable_by(Entry::cmp_value));
        });
    }

    /// Add a constant to every entry's column index, in parallel.
    ///
    /// Used when concatenating pages built from disjoint column ranges,
    /// e.g. column-split distributed data.
    pub fn reindex(&mut self, feature_offset: u32, n_threads: usize) {
        let data = self.data.as_mut_slice();
        run_with_threads(n_threads, |parallelism| {
            parallelism.maybe_par_for_each(data, |entry| entry.index += feature_offset);
        });
    }

    /// Split the entry array into one mutable slice per row.
    fn rows_mut(&mut self) -> Vec<&mut [Entry]> {
        let mut rows = Vec::with_capacity(self.size());
        let mut rest = self.data.as_mut_slice();
        let mut prev = 0u64;
        for &end in &self.offset[1..] {
            let (head, tail) = rest.split_at_mut((end - prev) as usize);
            rows.push(head);
            rest = tail;
            prev = end;
        }
        rows
    }

    // =========================================================================
    // CSC Merge
    // =========================================================================

    /// Merge another CSC-oriented page column by column.
    ///
    /// Rows of a CSC page are columns of the logical matrix, so merging
    /// interleaves each column's two contributions (this page's slice, then
    /// the other's) rather than appending whole pages. Degenerate cases are
    /// explicit: merging an entry-less page is a no-op, except that a page
    /// with no entries of its own adopts the incoming column shape, so the
    /// first merge into a fresh page establishes the feature count.
    ///
    /// # Panics
    /// Panics if both pages have entries but disagree on the column count.
    pub fn push_csc(&mut self, other: &SparsePage) {
        if other.data.is_empty() {
            if self.data.is_empty() {
                self.offset = other.offset.clone();
            }
            return;
        }
        if self.data.is_empty() {
            self.offset = other.offset.clone();
            self.data = other.data.clone();
            return;
        }

        assert_eq!(
            self.offset.len(),
            other.offset.len(),
            "cannot merge CSC pages with different column counts \
             (self entries: {}, other entries: {})",
            self.data.len(),
            other.data.len()
        );

        let n_features = other.offset.len() - 1;
        let mut offset = Vec::with_capacity(other.offset.len());
        offset.push(0u64);
        let mut data = Vec::with_capacity(self.data.len() + other.data.len());

        for i in 0..n_features {
            let self_slice =
                &self.data[self.offset[i] as usize..self.offset[i + 1] as usize];
            let other_slice =
                &other.data[other.offset[i] as usize..other.offset[i + 1] as usize];
            data.extend_from_slice(self_slice);
            data.extend_from_slice(other_slice);
            offset.push(data.len() as u64);
        }

        self.data = data;
        self.offset = offset;
        self.debug_check();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry_rows(page: &SparsePage) -> Vec<Vec<(u32, f32)>> {
        (0..page.size())
            .map(|i| page.row(i).iter().map(|e| (e.index, e.fvalue)).collect())
            .collect()
    }

    #[test]
    fn test_new_page_is_empty_but_well_shaped() {
        let page = SparsePage::new();
        assert_eq!(page.size(), 0);
        assert_eq!(page.offsets(), &[0]);
        assert!(page.entries().is_empty());
        assert_eq!(page.base_rowid(), 0);
    }

    #[test]
    fn test_from_parts_checks_shape() {
        let page = SparsePage::from_parts(vec![0, 1], vec![Entry::new(0, 1.0)], 5);
        assert_eq!(page.size(), 1);
        assert_eq!(page.base_rowid(), 5);
    }

    #[test]
    #[should_panic(expected = "offset/data length mismatch")]
    fn test_from_parts_rejects_length_mismatch() {
        let _ = SparsePage::from_parts(vec![0, 2], vec![Entry::new(0, 1.0)], 0);
    }

    #[test]
    fn test_push_page_appends_rows() {
        let mut a = SparsePage::from_parts(
            vec![0, 2],
            vec![Entry::new(0, 1.0), Entry::new(1, 2.0)],
            0,
        );
        let b = SparsePage::from_parts(vec![0, 0, 1], vec![Entry::new(3, 4.0)], 0);
        a.push(&b);
        assert_eq!(a.offsets(), &[0, 2, 2, 3]);
        assert_eq!(
            entry_rows(&a),
            vec![vec![(0, 1.0), (1, 2.0)], vec![], vec![(3, 4.0)]]
        );
    }

    #[test]
    fn test_push_into_empty_page() {
        let mut a = SparsePage::new();
        let b = SparsePage::from_parts(vec![0, 1], vec![Entry::new(2, 9.0)], 0);
        a.push(&b);
        assert_eq!(a.offsets(), &[0, 1]);
        assert_eq!(entry_rows(&a), vec![vec![(2, 9.0)]]);
    }

    #[test]
    fn test_sort_indices_and_check() {
        let mut page = SparsePage::from_parts(
            vec![0, 3, 4],
            vec![
                Entry::new(2, 1.0),
                Entry::new(0, 2.0),
                Entry::new(1, 3.0),
                Entry::new(0, 4.0),
            ],
            0,
        );
        assert!(!page.is_indices_sorted(1));
        page.sort_indices(1);
        assert!(page.is_indices_sorted(1));
        assert_eq!(
            entry_rows(&page),
            vec![vec![(0, 2.0), (1, 3.0), (2, 1.0)], vec![(0, 4.0)]]
        );
    }

    #[test]
    fn test_is_indices_sorted_on_empty_page() {
        let page = SparsePage::new();
        assert!(page.is_indices_sorted(4));
    }

    #[test]
    fn test_sort_rows_orders_by_value() {
        let mut page = SparsePage::from_parts(
            vec![0, 3],
            vec![Entry::new(0, 3.0), Entry::new(1, 1.0), Entry::new(2, 2.0)],
            0,
        );
        page.sort_rows(1);
        assert_eq!(entry_rows(&page), vec![vec![(1, 1.0), (2, 2.0), (0, 3.0)]]);
    }

    #[test]
    fn test_reindex_shifts_columns() {
        let mut page = SparsePage::from_parts(
            vec![0, 2],
            vec![Entry::new(0, 1.0), Entry::new(3, 2.0)],
            0,
        );
        page.reindex(10, 2);
        assert_eq!(entry_rows(&page), vec![vec![(10, 1.0), (13, 2.0)]]);
    }

    #[test]
    fn test_mem_cost_bytes_counts_both_arrays() {
        let page = SparsePage::from_parts(vec![0, 1], vec![Entry::new(0, 1.0)], 0);
        let expected =
            2 * std::mem::size_of::<u64>() + std::mem::size_of::<Entry>();
        assert_eq!(page.mem_cost_bytes(), expected);
    }
}
