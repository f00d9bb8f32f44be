//! Worker pool for the parallel per-row pass
//!
//! Queries use a crate-local Rayon pool rather than the global one. If the pool
//! cannot be created, parallel queries run on the calling thread instead.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::OnceLock;

use rayon::prelude::*;
use rayon::ThreadPool;
use tracing::warn;

use minicube_common::error::Result;
use minicube_common::types::ExecutionMode;

static WORKER_POOL: OnceLock<Option<ThreadPool>> = OnceLock::new();
static REQUESTED_THREADS: AtomicUsize = AtomicUsize::new(0);

/// Size the worker pool; 0 means one thread per CPU
///
/// Only effective before the first parallel query, returns false afterwards.
pub fn init_worker_pool(threads: usize) -> bool {
    REQUESTED_THREADS.store(threads, Ordering::Relaxed);
    WORKER_POOL.get().is_none()
}

fn build_pool() -> Option<ThreadPool> {
    let requested = match REQUESTED_THREADS.load(Ordering::Relaxed) {
        0 => num_cpus::get(),
        n => n,
    }
    .max(1);
    let try_build = |n| {
        rayon::ThreadPoolBuilder::new()
            .num_threads(n)
            .thread_name(|i| format!("minicube-worker-{i}"))
            .build()
    };

    match try_build(requested) {
        Ok(pool) => Some(pool),
        Err(e) if requested > 1 => {
            warn!("Failed to start {} cube workers ({}), retrying with one", requested, e);
            try_build(1).ok()
        }
        Err(e) => {
            warn!("Failed to start cube worker pool, queries will run sequentially: {}", e);
            None
        }
    }
}

fn worker_pool() -> Option<&'static ThreadPool> {
    WORKER_POOL.get_or_init(build_pool).as_ref()
}

/// Fold every row position into an accumulator and combine the partials
///
/// `identity` seeds each partial, `fold` consumes one position and `reduce`
/// combines two partials. Both modes produce the same result for associative and
/// commutative `reduce`.
pub(crate) fn fold_rows<T, I, F, R>(
    mode: ExecutionMode,
    positions: &[usize],
    identity: I,
    fold: F,
    reduce: R,
) -> Result<T>
where
    T: Send,
    I: Fn() -> T + Sync + Send,
    F: Fn(T, usize) -> Result<T> + Sync + Send,
    R: Fn(T, T) -> T + Sync + Send,
{
    match (mode, worker_pool()) {
        (ExecutionMode::Parallel, Some(pool)) => pool.install(|| {
            positions
                .par_iter()
                .try_fold(&identity, |acc, position| fold(acc, *position))
                .try_reduce(&identity, |a, b| Ok(reduce(a, b)))
        }),
        _ => positions
            .iter()
            .try_fold(identity(), |acc, position| fold(acc, *position)),
    }
}
