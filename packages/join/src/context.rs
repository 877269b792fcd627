//! Explicit execution context for partitioned, data-parallel stages.
//!
//! Every stage receives the [`ExecutionContext`] as an argument; there is
//! no global session. Row-wise work is split into fixed-size chunks run on
//! a dedicated rayon pool, and keyed work is hash-partitioned into
//! `shuffle_partitions` buckets.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use rayon::ThreadPool;
use rayon::ThreadPoolBuilder;
use rayon::prelude::*;

use crate::JoinError;

/// Configuration for an [`ExecutionContext`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOptions {
    /// Worker threads. `None` uses the platform's available parallelism.
    pub num_threads: Option<usize>,
    /// Rows per map partition.
    pub chunk_size: usize,
    /// Number of buckets keyed data is shuffled into before joining.
    pub shuffle_partitions: usize,
    /// Upper bound on rows (both join sides) in one shuffle partition.
    /// Exceeding it fails the run instead of letting one skewed key grow a
    /// single partition without bound.
    pub max_partition_rows: Option<usize>,
}

impl Default for ExecutionOptions {
    fn default() -> Self {
        Self {
            num_threads: None,
            chunk_size: 4_096,
            shuffle_partitions: 2,
            max_partition_rows: None,
        }
    }
}

/// A worker pool plus partitioning policy, passed through each stage.
pub struct ExecutionContext {
    pool: ThreadPool,
    opts: ExecutionOptions,
}

impl ExecutionContext {
    /// Builds a context and its worker pool.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::InvalidOptions`] if `chunk_size`,
    /// `shuffle_partitions`, or `num_threads` is zero, and
    /// [`JoinError::ThreadPool`] if the pool cannot be started.
    pub fn new(opts: ExecutionOptions) -> Result<Self, JoinError> {
        if opts.chunk_size == 0 {
            return Err(JoinError::InvalidOptions("chunk_size must be > 0"));
        }
        if opts.shuffle_partitions == 0 {
            return Err(JoinError::InvalidOptions("shuffle_partitions must be > 0"));
        }
        if opts.num_threads == Some(0) {
            return Err(JoinError::InvalidOptions("num_threads must be > 0 when set"));
        }

        let n_threads = opts
            .num_threads
            .unwrap_or_else(|| std::thread::available_parallelism().map_or(1, usize::from));

        let pool = ThreadPoolBuilder::new()
            .num_threads(n_threads)
            .thread_name(|i| format!("school-crime-{i}"))
            .build()?;

        log::debug!(
            "Execution context: {n_threads} threads, chunk_size={}, shuffle_partitions={}",
            opts.chunk_size,
            opts.shuffle_partitions
        );

        Ok(Self { pool, opts })
    }

    #[must_use]
    pub const fn options(&self) -> &ExecutionOptions {
        &self.opts
    }

    #[must_use]
    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Applies `f` to every row, one chunk per task. Output order matches
    /// input order.
    pub fn map_partitions<'a, T, R, F>(&self, rows: &'a [T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&'a T) -> R + Send + Sync,
    {
        self.flat_map_partitions(rows, |row| std::iter::once(f(row)))
    }

    /// Applies `f` to every row, keeping only `Some` results.
    pub fn filter_map_partitions<'a, T, R, F>(&self, rows: &'a [T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        F: Fn(&'a T) -> Option<R> + Send + Sync,
    {
        self.flat_map_partitions(rows, f)
    }

    /// Expands every row into zero or more outputs.
    pub fn flat_map_partitions<'a, T, R, I, F>(&self, rows: &'a [T], f: F) -> Vec<R>
    where
        T: Sync,
        R: Send,
        I: IntoIterator<Item = R>,
        F: Fn(&'a T) -> I + Send + Sync,
    {
        self.pool.install(|| {
            rows.par_chunks(self.opts.chunk_size)
                .map(|chunk| chunk.iter().flat_map(&f).collect::<Vec<_>>())
                .collect::<Vec<_>>()
                .into_iter()
                .flatten()
                .collect()
        })
    }

    /// Redistributes items into `shuffle_partitions` buckets by key hash.
    /// Items with equal keys always land in the same bucket.
    pub fn hash_partition<T, K, F>(&self, items: Vec<T>, key: F) -> Vec<Vec<T>>
    where
        T: Send,
        K: Hash,
        F: Fn(&T) -> K + Send + Sync,
    {
        let n = self.opts.shuffle_partitions;
        self.pool.install(|| {
            items
                .into_par_iter()
                .fold(
                    || empty_buckets(n),
                    |mut buckets, item| {
                        buckets[partition_for(&key(&item), n)].push(item);
                        buckets
                    },
                )
                .reduce(
                    || empty_buckets(n),
                    |mut a, b| {
                        for (dst, src) in a.iter_mut().zip(b) {
                            dst.extend(src);
                        }
                        a
                    },
                )
        })
    }

    /// Runs two independent stages concurrently on the pool.
    pub fn run_concurrently<A, B, RA, RB>(&self, a: A, b: B) -> (RA, RB)
    where
        A: FnOnce() -> RA + Send,
        B: FnOnce() -> RB + Send,
        RA: Send,
        RB: Send,
    {
        self.pool.install(|| rayon::join(a, b))
    }

    /// Runs `f` once per partition index in parallel.
    pub fn for_each_partition<R, F>(&self, f: F) -> Vec<R>
    where
        R: Send,
        F: Fn(usize) -> R + Send + Sync,
    {
        self.pool
            .install(|| (0..self.opts.shuffle_partitions).into_par_iter().map(f).collect())
    }
}

fn empty_buckets<T>(n: usize) -> Vec<Vec<T>> {
    (0..n).map(|_| Vec::new()).collect()
}

/// Bucket for a key. Uses a fixed-key hasher so placement is stable
/// across runs.
#[allow(clippy::cast_possible_truncation)]
fn partition_for<K: Hash>(key: &K, n: usize) -> usize {
    let mut hasher = DefaultHasher::new();
    key.hash(&mut hasher);
    (hasher.finish() % n as u64) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx(chunk_size: usize, shuffle_partitions: usize) -> ExecutionContext {
        ExecutionContext::new(ExecutionOptions {
            num_threads: Some(4),
            chunk_size,
            shuffle_partitions,
            max_partition_rows: None,
        })
        .unwrap()
    }

    #[test]
    fn map_preserves_order_across_chunks() {
        let rows: Vec<u32> = (0..1_000).collect();
        let out = ctx(7, 2).map_partitions(&rows, |r| r * 2);
        assert_eq!(out, rows.iter().map(|r| r * 2).collect::<Vec<_>>());
    }

    #[test]
    fn filter_map_drops_none() {
        let rows: Vec<u32> = (0..100).collect();
        let out = ctx(16, 2).filter_map_partitions(&rows, |r| (r % 10 == 0).then_some(*r));
        assert_eq!(out, vec![0, 10, 20, 30, 40, 50, 60, 70, 80, 90]);
    }

    #[test]
    fn flat_map_expands_rows() {
        let rows = vec![1_usize, 2, 3];
        let out = ctx(1, 2).flat_map_partitions(&rows, |r| vec![*r; *r]);
        assert_eq!(out, vec![1, 2, 2, 3, 3, 3]);
    }

    #[test]
    fn empty_input_maps_to_empty_output() {
        let rows: Vec<u32> = Vec::new();
        assert!(ctx(4, 2).map_partitions(&rows, |r| *r).is_empty());
    }

    #[test]
    fn hash_partition_colocates_equal_keys() {
        let items: Vec<(u32, u32)> = (0..500).map(|i| (i % 13, i)).collect();
        let partitions = ctx(8, 5).hash_partition(items, |(k, _)| *k);

        assert_eq!(partitions.len(), 5);
        assert_eq!(partitions.iter().map(Vec::len).sum::<usize>(), 500);
        for key in 0..13 {
            let holding: Vec<usize> = partitions
                .iter()
                .enumerate()
                .filter(|(_, p)| p.iter().any(|(k, _)| *k == key))
                .map(|(i, _)| i)
                .collect();
            assert_eq!(holding.len(), 1, "key {key} split across {holding:?}");
        }
    }

    #[test]
    fn run_concurrently_returns_both_results() {
        let (a, b) = ctx(8, 2).run_concurrently(|| 1 + 1, || "done");
        assert_eq!(a, 2);
        assert_eq!(b, "done");
    }

    #[test]
    fn for_each_partition_visits_every_index() {
        let mut seen = ctx(8, 6).for_each_partition(|i| i);
        seen.sort_unstable();
        assert_eq!(seen, vec![0, 1, 2, 3, 4, 5]);
    }

    #[test]
    fn rejects_zero_sizes() {
        for opts in [
            ExecutionOptions {
                chunk_size: 0,
                ..ExecutionOptions::default()
            },
            ExecutionOptions {
                shuffle_partitions: 0,
                ..ExecutionOptions::default()
            },
            ExecutionOptions {
                num_threads: Some(0),
                ..ExecutionOptions::default()
            },
        ] {
            assert!(matches!(
                ExecutionContext::new(opts),
                Err(JoinError::InvalidOptions(_))
            ));
        }
    }
}
