//! Adapter-batch ingestion tests.
//!
//! These cover the two-pass append path: missing-value filtering, the
//! admissibility rule for infinities, sequential batch appends, and
//! thread-count independence of the result.

use approx::assert_relative_eq;
use ndarray::{array, Array2};
use sparse_page::{CscAdapter, CsrAdapter, DenseAdapter, PageError, SparsePage};

fn rows(page: &SparsePage) -> Vec<Vec<(u32, f32)>> {
    (0..page.size())
        .map(|i| page.row(i).iter().map(|e| (e.index, e.fvalue)).collect())
        .collect()
}

#[test]
fn test_nan_and_sentinel_both_excluded() {
    // one row, values [1.0, NaN, missing=0.0, 0.0] at columns [0, 1, 2, 3]
    let indptr = [0usize, 4];
    let indices = [0u64, 1, 2, 3];
    let values = [1.0f32, f32::NAN, 0.0, 0.0];
    let batch = CsrAdapter::new(&indptr, &indices, &values);

    let mut page = SparsePage::new();
    let n_columns = page.push_batch(&batch, 0.0, 1).unwrap();

    // the max column index is tracked regardless of validity
    assert_eq!(n_columns, 4);
    assert_eq!(page.offsets(), &[0, 1]);
    assert_eq!(page.row(0).len(), 1);
    assert_eq!(page.row(0)[0].index, 0);
    assert_relative_eq!(page.row(0)[0].fvalue, 1.0);
}

#[test]
fn test_sequential_batches_append_rows() {
    let mut page = SparsePage::new();

    let indptr = [0usize, 1];
    let batch_a = CsrAdapter::new(&indptr, &[0u64], &[5.0f32]);
    page.push_batch(&batch_a, f32::NAN, 1).unwrap();

    // the second batch continues the global row numbering
    let batch_b = CsrAdapter::with_base_row(&indptr, &[1u64], &[6.0f32], 1);
    page.push_batch(&batch_b, f32::NAN, 1).unwrap();

    assert_eq!(page.offsets(), &[0, 1, 2]);
    assert_eq!(rows(&page), vec![vec![(0, 5.0)], vec![(1, 6.0)]]);
}

#[test]
fn test_empty_batch_is_a_noop() {
    let mut page = SparsePage::new();
    let empty = Array2::<f32>::zeros((0, 3));
    let n_columns = page
        .push_batch(&DenseAdapter::new(empty.view()), 0.0, 4)
        .unwrap();

    assert_eq!(n_columns, 0);
    assert_eq!(page.offsets(), &[0]);
    assert!(page.entries().is_empty());
    assert_eq!(page.base_rowid(), 0);
}

#[test]
fn test_infinite_value_with_finite_missing_fails() {
    let values = array![[1.0, f32::INFINITY], [2.0, 3.0]];
    let mut page = SparsePage::new();
    let err = page
        .push_batch(&DenseAdapter::new(values.view()), 0.0, 2)
        .unwrap_err();

    assert!(matches!(err, PageError::InfInData { .. }));
    // the failed append leaves the page untouched
    assert_eq!(page.offsets(), &[0]);
    assert!(page.entries().is_empty());
}

#[test]
fn test_infinite_missing_admits_and_drops_infinities() {
    let values = array![[f32::INFINITY, 2.0]];
    let mut page = SparsePage::new();
    page.push_batch(&DenseAdapter::new(values.view()), f32::INFINITY, 1)
        .unwrap();

    assert_eq!(rows(&page), vec![vec![(1, 2.0)]]);
}

#[test]
fn test_nan_missing_keeps_zeros() {
    let values = array![[0.0, 1.0]];
    let mut page = SparsePage::new();
    page.push_batch(&DenseAdapter::new(values.view()), f32::NAN, 1)
        .unwrap();

    assert_eq!(rows(&page), vec![vec![(0, 0.0), (1, 1.0)]]);
}

#[test]
fn test_dense_ingest_drops_sentinel_cells() {
    let values = array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0], [4.0, 0.0, 5.0]];
    let mut page = SparsePage::new();
    let n_columns = page
        .push_batch(&DenseAdapter::new(values.view()), 0.0, 2)
        .unwrap();

    assert_eq!(n_columns, 3);
    assert_eq!(page.offsets(), &[0, 2, 3, 5]);
    assert_eq!(
        rows(&page),
        vec![
            vec![(0, 1.0), (2, 2.0)],
            vec![(1, 3.0)],
            vec![(0, 4.0), (2, 5.0)],
        ]
    );
}

#[test]
fn test_csc_batch_matches_csr_batch() {
    // [[. 1 .], [2 . 3]] in both layouts
    let csr_indptr = [0usize, 1, 3];
    let csr_indices = [1u64, 0, 2];
    let csr_values = [1.0f32, 2.0, 3.0];

    let csc_indptr = [0usize, 1, 2, 3];
    let csc_rows = [1u64, 0, 1];
    let csc_values = [2.0f32, 1.0, 3.0];

    let mut from_csr = SparsePage::new();
    from_csr
        .push_batch(
            &CsrAdapter::new(&csr_indptr, &csr_indices, &csr_values),
            f32::NAN,
            4,
        )
        .unwrap();

    // column-major ingestion is forced to a single thread internally
    let mut from_csc = SparsePage::new();
    from_csc
        .push_batch(
            &CscAdapter::new(&csc_indptr, &csc_rows, &csc_values),
            f32::NAN,
            4,
        )
        .unwrap();

    assert_eq!(rows(&from_csr), rows(&from_csc));
}

#[test]
fn test_thread_count_does_not_change_the_result() {
    // slice boundaries move with the thread count, the output must not
    let values = Array2::from_shape_fn((64, 7), |(i, j)| {
        if (i * 7 + j) % 3 == 0 {
            0.0
        } else {
            (i * 7 + j) as f32
        }
    });

    let mut reference = SparsePage::new();
    reference
        .push_batch(&DenseAdapter::new(values.view()), 0.0, 1)
        .unwrap();

    for n_threads in [2, 3, 4, 8] {
        let mut page = SparsePage::new();
        page.push_batch(&DenseAdapter::new(values.view()), 0.0, n_threads)
            .unwrap();
        assert_eq!(page, reference, "n_threads = {}", n_threads);
    }
}

#[test]
#[should_panic(expected = "below the builder base")]
fn test_batch_rows_below_existing_rows_rejected() {
    let mut page = SparsePage::new();
    let indptr = [0usize, 1];
    let batch = CsrAdapter::new(&indptr, &[0u64], &[5.0f32]);
    page.push_batch(&batch, f32::NAN, 1).unwrap();

    // same row numbering again: tries to extend a row that already exists
    let stale = CsrAdapter::new(&indptr, &[1u64], &[6.0f32]);
    let _ = page.push_batch(&stale, f32::NAN, 1);
}
