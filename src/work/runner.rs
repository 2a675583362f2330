use crate::work::storage::WorkStorage;
use rayon::prelude::*;

/// Strategy for invoking every job of a [`WorkStorage`] once.
///
/// Running never mutates or destroys the storage, so the same storage can be
/// run any number of times.
pub trait WorkRunner: Default + Send + Sync {
    /// Invoke every stored job with `args`.
    fn run<A, S>(&self, storage: &S, args: A)
    where
        A: Copy + Send + Sync + 'static,
        S: WorkStorage<A>;
}

/// Runs jobs on the calling thread in enqueue order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Ordered;

/// Runs jobs on the calling thread in reverse enqueue order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Reverse;

/// Runs jobs in parallel on the rayon pool, in no particular order.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Unordered;

impl WorkRunner for Ordered {
    fn run<A, S>(&self, storage: &S, args: A)
    where
        A: Copy + Send + Sync + 'static,
        S: WorkStorage<A>,
    {
        for job in storage.iter() {
            job.call(args);
        }
    }
}

impl WorkRunner for Reverse {
    fn run<A, S>(&self, storage: &S, args: A)
    where
        A: Copy + Send + Sync + 'static,
        S: WorkStorage<A>,
    {
        for job in storage.iter().rev() {
            job.call(args);
        }
    }
}

impl WorkRunner for Unordered {
    fn run<A, S>(&self, storage: &S, args: A)
    where
        A: Copy + Send + Sync + 'static,
        S: WorkStorage<A>,
    {
        (0..storage.len()).into_par_iter().for_each(|idx| {
            if let Some(job) = storage.get(idx) {
                job.call(args);
            }
        });
    }
}
