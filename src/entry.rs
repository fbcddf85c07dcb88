//! Fixed-width sparse matrix entry.
//!
//! [`Entry`] is the record type every page stores: a column index paired
//! with a feature value. Pages keep entries in flat arrays, so the type is
//! `Copy` and has a fixed layout.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// A single (column index, value) record of a sparse row.
///
/// When a page is transposed the roles flip: `index` holds the original
/// row index and the page's rows are columns of the logical matrix.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    /// Column index of the value (row index in a transposed page).
    pub index: u32,
    /// Feature value.
    pub fvalue: f32,
}

impl Entry {
    #[inline]
    pub fn new(index: u32, fvalue: f32) -> Self {
        Self { index, fvalue }
    }

    /// Order entries by column index ascending.
    #[inline]
    pub fn cmp_index(a: &Entry, b: &Entry) -> Ordering {
        a.index.cmp(&b.index)
    }

    /// Order entries by value ascending. NaN values compare equal to
    /// everything, which keeps the sort total.
    #[inline]
    pub fn cmp_value(a: &Entry, b: &Entry) -> Ordering {
        a.fvalue.partial_cmp(&b.fvalue).unwrap_or(Ordering::Equal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cmp_index_orders_by_column() {
        let mut entries = vec![Entry::new(2, 1.0), Entry::new(0, 3.0), Entry::new(1, 2.0)];
        entries.sort_unstable_by(Entry::cmp_index);
        let indices: Vec<u32> = entries.iter().map(|e| e.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
    }

    #[test]
    fn test_cmp_value_orders_by_value() {
        let mut entries = vec![Entry::new(0, 3.0), Entry::new(1, 1.0), Entry::new(2, 2.0)];
        entries.sort_unstable_by(Entry::cmp_value);
        let values: Vec<f32> = entries.iter().map(|e| e.fvalue).collect();
        assert_eq!(values, vec![1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_cmp_value_tolerates_nan() {
        // NaN must not panic the comparator; order among NaNs is unspecified.
        let mut entries = vec![Entry::new(0, f32::NAN), Entry::new(1, 1.0)];
        entries.sort_unstable_by(Entry::cmp_value);
        assert_eq!(entries.len(), 2);
    }
}
