//! Uniform batch contract for heterogeneous input sources.
//!
//! Any input source feeds the page through the same shape: a batch exposes
//! a number of lines, and each line lazily yields `(row, column, value)`
//! tuples. For a row-major source a line is one row; for a column-major
//! source a line is one column and the tuples carry their real row index.
//! The page consults [`AdapterBatch::IS_ROW_MAJOR`] once per ingest to pick
//! its threading strategy.
//!
//! Row indices are expressed in the batch's global numbering; the page
//! subtracts its own `base_rowid`. Sources that arrive in several batches
//! keep numbering rows across batches, which is what the `base_row`
//! constructors here are for.

use ndarray::{ArrayView1, ArrayView2};

/// One `(row, column, value)` element of a batch line.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CooTuple {
    pub row_idx: u64,
    pub column_idx: u64,
    pub value: f32,
}

impl CooTuple {
    #[inline]
    pub fn new(row_idx: u64, column_idx: u64, value: f32) -> Self {
        Self {
            row_idx,
            column_idx,
            value,
        }
    }
}

/// One lazily materialized line of a batch.
pub trait BatchLine {
    /// Number of elements on this line.
    fn size(&self) -> usize;

    /// The `j`-th element of this line.
    fn get_element(&self, j: usize) -> CooTuple;
}

/// A batch of input lines consumable by the page's two-pass ingest.
///
/// Implementations must be cheap to index: both passes re-walk the same
/// lines, so `line` is called twice per line per ingest.
pub trait AdapterBatch: Sync {
    type Line<'a>: BatchLine
    where
        Self: 'a;

    /// Whether lines are rows (`true`) or columns (`false`). Column-major
    /// batches are ingested single-threaded to bound scratch memory.
    const IS_ROW_MAJOR: bool;

    /// Number of lines in the batch.
    fn size(&self) -> usize;

    /// The `i`-th line.
    fn line(&self, i: usize) -> Self::Line<'_>;
}

// =============================================================================
// Dense Adapter
// =============================================================================

/// Row-major batch over a dense `[n_rows, n_columns]` ndarray view.
///
/// Every cell is reported, including the missing sentinel; filtering is the
/// page's job.
#[derive(Clone, Copy, Debug)]
pub struct DenseAdapter<'a> {
    values: ArrayView2<'a, f32>,
    base_row: u64,
}

impl<'a> DenseAdapter<'a> {
    pub fn new(values: ArrayView2<'a, f32>) -> Self {
        Self::with_base_row(values, 0)
    }

    /// Adapter whose rows are numbered starting at `base_row`.
    pub fn with_base_row(values: ArrayView2<'a, f32>, base_row: u64) -> Self {
        Self { values, base_row }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct DenseLine<'a> {
    row: ArrayView1<'a, f32>,
    row_idx: u64,
}

impl BatchLine for DenseLine<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.row.len()
    }

    #[inline]
    fn get_element(&self, j: usize) -> CooTuple {
        CooTuple::new(self.row_idx, j as u64, self.row[j])
    }
}

impl AdapterBatch for DenseAdapter<'_> {
    type Line<'b>
        = DenseLine<'b>
    where
        Self: 'b;

    const IS_ROW_MAJOR: bool = true;

    #[inline]
    fn size(&self) -> usize {
        self.values.nrows()
    }

    #[inline]
    fn line(&self, i: usize) -> DenseLine<'_> {
        DenseLine {
            row: self.values.row(i),
            row_idx: self.base_row + i as u64,
        }
    }
}

// =============================================================================
// CSR Adapter
// =============================================================================

/// Row-major batch over borrowed CSR arrays.
///
/// `indptr` has one element per row plus one; row `i` owns
/// `indices[indptr[i]..indptr[i + 1]]` and the matching `values` range.
#[derive(Clone, Copy, Debug)]
pub struct CsrAdapter<'a> {
    indptr: &'a [usize],
    indices: &'a [u64],
    values: &'a [f32],
    base_row: u64,
}

impl<'a> CsrAdapter<'a> {
    pub fn new(indptr: &'a [usize], indices: &'a [u64], values: &'a [f32]) -> Self {
        Self::with_base_row(indptr, indices, values, 0)
    }

    /// Adapter whose rows are numbered starting at `base_row`.
    pub fn with_base_row(
        indptr: &'a [usize],
        indices: &'a [u64],
        values: &'a [f32],
        base_row: u64,
    ) -> Self {
        assert!(!indptr.is_empty(), "CSR indptr must hold a leading zero");
        assert_eq!(indices.len(), values.len());
        assert_eq!(*indptr.last().expect("checked non-empty"), values.len());
        Self {
            indptr,
            indices,
            values,
            base_row,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CsrLine<'a> {
    indices: &'a [u64],
    values: &'a [f32],
    row_idx: u64,
}

impl BatchLine for CsrLine<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn get_element(&self, j: usize) -> CooTuple {
        CooTuple::new(self.row_idx, self.indices[j], self.values[j])
    }
}

impl AdapterBatch for CsrAdapter<'_> {
    type Line<'b>
        = CsrLine<'b>
    where
        Self: 'b;

    const IS_ROW_MAJOR: bool = true;

    #[inline]
    fn size(&self) -> usize {
        self.indptr.len() - 1
    }

    #[inline]
    fn line(&self, i: usize) -> CsrLine<'_> {
        let beg = self.indptr[i];
        let end = self.indptr[i + 1];
        CsrLine {
            indices: &self.indices[beg..end],
            values: &self.values[beg..end],
            row_idx: self.base_row + i as u64,
        }
    }
}

// =============================================================================
// CSC Adapter
// =============================================================================

/// Column-major batch over borrowed CSC arrays.
///
/// Lines are columns; `indptr` has one element per column plus one, and
/// `row_indices` names the row of every value.
#[derive(Clone, Copy, Debug)]
pub struct CscAdapter<'a> {
    indptr: &'a [usize],
    row_indices: &'a [u64],
    values: &'a [f32],
    base_row: u64,
}

impl<'a> CscAdapter<'a> {
    pub fn new(indptr: &'a [usize], row_indices: &'a [u64], values: &'a [f32]) -> Self {
        Self::with_base_row(indptr, row_indices, values, 0)
    }

    /// Adapter whose rows are numbered starting at `base_row`.
    pub fn with_base_row(
        indptr: &'a [usize],
        row_indices: &'a [u64],
        values: &'a [f32],
        base_row: u64,
    ) -> Self {
        assert!(!indptr.is_empty(), "CSC indptr must hold a leading zero");
        assert_eq!(row_indices.len(), values.len());
        assert_eq!(*indptr.last().expect("checked non-empty"), values.len());
        Self {
            indptr,
            row_indices,
            values,
            base_row,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct CscLine<'a> {
    row_indices: &'a [u64],
    values: &'a [f32],
    column_idx: u64,
    base_row: u64,
}

impl BatchLine for CscLine<'_> {
    #[inline]
    fn size(&self) -> usize {
        self.values.len()
    }

    #[inline]
    fn get_element(&self, j: usize) -> CooTuple {
        CooTuple::new(
            self.base_row + self.row_indices[j],
            self.column_idx,
            self.values[j],
        )
    }
}

impl AdapterBatch for CscAdapter<'_> {
    type Line<'b>
        = CscLine<'b>
    where
        Self: 'b;

    const IS_ROW_MAJOR: bool = false;

    #[inline]
    fn size(&self) -> usize {
        self.indptr.len() - 1
    }

    #[inline]
    fn line(&self, i: usize) -> CscLine<'_> {
        let beg = self.indptr[i];
        let end = self.indptr[i + 1];
        CscLine {
            row_indices: &self.row_indices[beg..end],
            values: &self.values[beg..end],
            column_idx: i as u64,
            base_row: self.base_row,
        }
    }
}
