//! sparse-page: in-memory sparse-matrix assembly for gradient boosting
//! data pipelines.
//!
//! Turns heterogeneous input batches (dense arrays, CSR/CSC arrays) into a
//! canonical compressed-sparse-row page, and transforms that page
//! (transpose to CSC, sort, reindex, merge) for downstream histogram
//! building and distributed training.
//!
//! # Key Types
//!
//! - [`SparsePage`] - The canonical CSR container and its operations
//! - [`Entry`] - The fixed-width (column index, value) record
//! - [`AdapterBatch`] - The uniform contract any input source satisfies
//! - [`DenseAdapter`] / [`CsrAdapter`] / [`CscAdapter`] - In-memory sources
//! - [`ParallelGroupBuilder`] - The two-pass lock-free bucketing primitive
//!
//! # Ingestion
//!
//! Wrap the source in an adapter and hand it to
//! [`SparsePage::push_batch`] with the missing-value sentinel and a thread
//! count. The page runs two parallel passes over the batch: one to budget
//! per-row storage, one to place entries, with no per-record locking.
//!
//! ```
//! use ndarray::array;
//! use sparse_page::{DenseAdapter, SparsePage};
//!
//! let values = array![[1.0, 0.0, 2.0], [0.0, 3.0, 0.0]];
//! let mut page = SparsePage::new();
//! page.push_batch(&DenseAdapter::new(values.view()), 0.0, 2)
//!     .unwrap();
//!
//! assert_eq!(page.offsets(), &[0, 2, 3]);
//! let csc = page.get_transpose(3, 2);
//! assert_eq!(csc.size(), 3);
//! ```

pub mod adapter;
pub mod entry;
pub mod group_builder;
pub mod page;
pub mod utils;
pub mod validity;

pub use adapter::{AdapterBatch, BatchLine, CooTuple, CscAdapter, CsrAdapter, DenseAdapter};
pub use entry::Entry;
pub use group_builder::{BudgetTally, GroupWriter, ParallelGroupBuilder};
pub use page::{PageError, SparsePage};
pub use utils::{run_with_threads, Parallelism};
pub use validity::IsValid;
