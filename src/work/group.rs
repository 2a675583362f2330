use crate::work::{
    alloc::{Global, StorageError},
    runner::{Ordered, WorkRunner},
    storage::{RaggedArrayOfObjects, WorkStorage},
    vtable::Job,
};
use core::{fmt, marker::PhantomData, ops::Range};

/// Collects jobs into a storage until [`instantiate`](Self::instantiate)
/// turns them into a runnable [`WorkGroup`].
///
/// The pool remembers the size of the biggest batch it produced and
/// pre-reserves that much for the next one, so steady-state batches do not
/// regrow.
pub struct WorkPool<A, S = RaggedArrayOfObjects<A>, Rn = Ordered>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    Rn: WorkRunner,
{
    storage: S,
    max_num_jobs: usize,
    max_storage_bytes: usize,
    _marker: PhantomData<(fn(A), Rn)>,
}

/// An immutable batch of jobs, runnable any number of times.
pub struct WorkGroup<A, S = RaggedArrayOfObjects<A>, Rn = Ordered>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    Rn: WorkRunner,
{
    storage: S,
    runner: Rn,
    _marker: PhantomData<fn(A)>,
}

impl<A, S, Rn> WorkPool<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A, Allocator = Global>,
    Rn: WorkRunner,
{
    /// Empty pool on the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A, S, Rn> Default for WorkPool<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A, Allocator = Global>,
    Rn: WorkRunner,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, Rn> WorkPool<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    S::Allocator: Clone,
    Rn: WorkRunner,
{
    /// Empty pool allocating through `allocator`.
    #[must_use]
    pub fn new_in(allocator: S::Allocator) -> Self {
        Self {
            storage: S::new_in(allocator),
            max_num_jobs: 0,
            max_storage_bytes: 0,
            _marker: PhantomData,
        }
    }

    /// Number of jobs enqueued since the last `instantiate`.
    #[must_use]
    pub fn num_jobs(&self) -> usize {
        self.storage.len()
    }

    /// Bytes used by the jobs enqueued since the last `instantiate`.
    #[must_use]
    pub fn storage_bytes(&self) -> usize {
        self.storage.storage_bytes()
    }

    /// Pre-size the pending batch.
    ///
    /// # Errors
    /// If the allocation fails.
    pub fn reserve(&mut self, num_jobs: usize, storage_bytes: usize) -> Result<(), StorageError> {
        self.storage.reserve(num_jobs, storage_bytes)
    }

    /// Add a job to the pending batch.
    ///
    /// # Errors
    /// If the storage cannot grow. The pending batch is unchanged.
    pub fn enqueue(&mut self, job: impl Job<A>) -> Result<(), StorageError> {
        if self.storage.is_empty() && self.max_num_jobs != 0 {
            self.storage
                .reserve(self.max_num_jobs, self.max_storage_bytes)?;
        }
        self.storage.emplace(job)
    }

    /// Add a job that calls `body(i, args)` for every `i` in `range`, in
    /// increasing order.
    ///
    /// # Errors
    /// If the storage cannot grow. The pending batch is unchanged.
    pub fn enqueue_forall<F>(&mut self, range: Range<usize>, body: F) -> Result<(), StorageError>
    where
        F: Fn(usize, A) + Send + Sync + 'static,
    {
        self.enqueue(move |args: A| {
            for idx in range.clone() {
                body(idx, args);
            }
        })
    }

    /// Move the pending batch into a runnable group and start a new batch.
    #[must_use]
    pub fn instantiate(&mut self) -> WorkGroup<A, S, Rn> {
        self.max_num_jobs = self.max_num_jobs.max(self.storage.len());
        self.max_storage_bytes = self.max_storage_bytes.max(self.storage.storage_bytes());
        let fresh = self.storage.empty_like();
        WorkGroup {
            storage: core::mem::replace(&mut self.storage, fresh),
            runner: Rn::default(),
            _marker: PhantomData,
        }
    }

    /// Drop the pending batch and forget remembered batch sizes.
    pub fn clear(&mut self) {
        self.storage.clear();
        self.max_num_jobs = 0;
        self.max_storage_bytes = 0;
    }
}

impl<A, S, Rn> WorkGroup<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    Rn: WorkRunner,
{
    /// Invoke every job of the group once with `args`.
    pub fn run(&self, args: A) {
        self.runner.run(&self.storage, args);
    }

    /// Number of jobs in the group.
    #[must_use]
    pub fn len(&self) -> usize {
        self.storage.len()
    }

    /// Whether the group holds no job.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.storage.is_empty()
    }

    /// The underlying storage.
    #[must_use]
    pub fn storage(&self) -> &S {
        &self.storage
    }
}

impl<A, S, Rn> fmt::Debug for WorkPool<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A> + fmt::Debug,
    Rn: WorkRunner,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkPool")
            .field("storage", &self.storage)
            .field("max_num_jobs", &self.max_num_jobs)
            .field("max_storage_bytes", &self.max_storage_bytes)
            .finish()
    }
}

impl<A, S, Rn> fmt::Debug for WorkGroup<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A> + fmt::Debug,
    Rn: WorkRunner + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGroup")
            .field("storage", &self.storage)
            .field("runner", &self.runner)
            .finish()
    }
}
