//! Parallelism configuration and slice partitioning.
//!
//! Every public page operation takes an `n_threads` argument and routes it
//! through [`run_with_threads`], which installs a sized rayon pool and hands
//! the body a [`Parallelism`] flag. Components never manage thread pools
//! themselves; they just respect the flag.

use std::ops::Range;

use rayon::prelude::*;

// =============================================================================
// Parallelism Configuration
// =============================================================================

/// Whether parallel execution is allowed.
///
/// When `Parallel`, components may use rayon parallel iterators.
/// When `Sequential`, they must iterate sequentially.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Parallelism {
    Sequential,
    Parallel,
}

impl Parallelism {
    /// Create from thread count semantics.
    ///
    /// - 0 = auto (parallel if the rayon pool has multiple threads)
    /// - 1 = sequential
    /// - >1 = parallel
    #[inline]
    pub fn from_threads(n_threads: usize) -> Self {
        if n_threads == 1 || (n_threads == 0 && rayon::current_num_threads() == 1) {
            Parallelism::Sequential
        } else {
            Parallelism::Parallel
        }
    }

    /// Returns `true` if parallel execution is allowed.
    #[inline]
    pub fn is_parallel(self) -> bool {
        matches!(self, Parallelism::Parallel)
    }

    #[inline]
    pub fn maybe_par_for_each<T, I, F>(self, iter: I, f: F)
    where
        T: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().for_each(f);
        } else {
            iter.into_iter().for_each(f);
        }
    }

    #[inline]
    pub fn maybe_par_map<T, B, I, F>(self, iter: I, f: F) -> Vec<B>
    where
        T: Send,
        B: Send,
        I: IntoIterator<Item = T> + IntoParallelIterator<Item = T>,
        F: Fn(T) -> B + Sync + Send,
    {
        if self.is_parallel() {
            iter.into_par_iter().map(f).collect()
        } else {
            iter.into_iter().map(f).collect()
        }
    }
}

// =============================================================================
// Thread Pool Setup
// =============================================================================

/// Run a closure with the appropriate thread pool.
///
/// Thread count semantics:
/// - `0` = auto (use the ambient rayon pool)
/// - `1` = sequential (no thread pool)
/// - `n > 1` = use exactly `n` threads
#[inline]
pub fn run_with_threads<T: Send>(n_threads: usize, f: impl FnOnce(Parallelism) -> T + Send) -> T {
    let parallelism = Parallelism::from_threads(n_threads);

    match parallelism {
        Parallelism::Sequential => f(Parallelism::Sequential),
        Parallelism::Parallel => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(n_threads)
                .build()
                .expect("Failed to create thread pool");
            pool.install(|| f(Parallelism::Parallel))
        }
    }
}

/// Resolve a caller-facing thread count to a concrete worker count.
///
/// `0` means auto and resolves to the ambient rayon pool size. The result is
/// never zero; callers use it to size per-thread scratch tables before the
/// pool is entered.
#[inline]
pub fn resolve_n_threads(n_threads: usize) -> usize {
    if n_threads == 0 {
        rayon::current_num_threads().max(1)
    } else {
        n_threads
    }
}

// =============================================================================
// Slice Partitioning
// =============================================================================

/// Split `0..len` into `n_slices` static contiguous ranges.
///
/// Slice boundaries are `len / n_slices` apart with the remainder absorbed
/// by the last slice. There is no rebalancing: slice `t` is the fixed work
/// assignment of worker `t` in both passes of a two-pass build, so the
/// boundaries must be identical between the passes.
pub fn partition_ranges(len: usize, n_slices: usize) -> Vec<Range<usize>> {
    let n = n_slices.max(1);
    let chunk = len / n;
    (0..n)
        .map(|t| {
            let begin = t * chunk;
            let end = if t + 1 == n { len } else { (t + 1) * chunk };
            begin..end
        })
        .collect()
}
