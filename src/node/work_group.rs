use crate::{
    node::WorkItem,
    resource::Resource,
    work::{
        Global, Job, Ordered, RaggedArrayOfObjects, StorageError, WorkGroup, WorkPool,
        WorkRunner, WorkStorage,
    },
};
use core::{fmt, ops::Range};

/// A node running a batch of heterogeneous jobs.
///
/// Jobs are enqueued into a [`WorkPool`] while the graph is being built.
/// Enqueueing invalidates the current [`WorkGroup`], and the next `exec`
/// instantiates a fresh one from the pending jobs before running it with the
/// stored arguments.
pub struct WorkGroupNode<A, S = RaggedArrayOfObjects<A>, Rn = Ordered>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    Rn: WorkRunner,
{
    pool: WorkPool<A, S, Rn>,
    group: WorkGroup<A, S, Rn>,
    args: A,
    instantiated: bool,
}

impl<A, S, Rn> WorkGroupNode<A, S, Rn>
where
    A: Copy + Default + Send + Sync + 'static,
    S: WorkStorage<A, Allocator = Global>,
    Rn: WorkRunner,
{
    /// Empty node on the global allocator, with default arguments.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A, S, Rn> Default for WorkGroupNode<A, S, Rn>
where
    A: Copy + Default + Send + Sync + 'static,
    S: WorkStorage<A, Allocator = Global>,
    Rn: WorkRunner,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<A, S, Rn> WorkGroupNode<A, S, Rn>
where
    A: Copy + Default + Send + Sync + 'static,
    S: WorkStorage<A>,
    S::Allocator: Clone,
    Rn: WorkRunner,
{
    /// Empty node allocating through `allocator`, with default arguments.
    #[must_use]
    pub fn new_in(allocator: S::Allocator) -> Self {
        let mut pool = WorkPool::new_in(allocator);
        let group = pool.instantiate();
        Self {
            pool,
            group,
            args: A::default(),
            instantiated: true,
        }
    }

    /// Drop pending and instantiated jobs and reset the arguments.
    pub fn clear(&mut self) {
        self.pool.clear();
        self.group = self.pool.instantiate();
        self.args = A::default();
        self.instantiated = true;
    }
}

impl<A, S, Rn> WorkGroupNode<A, S, Rn>
where
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    S::Allocator: Clone,
    Rn: WorkRunner,
{
    /// Number of pending jobs.
    #[must_use]
    pub fn num_jobs(&self) -> usize {
        self.pool.num_jobs()
    }

    /// Bytes used by pending jobs.
    #[must_use]
    pub fn storage_bytes(&self) -> usize {
        self.pool.storage_bytes()
    }

    /// Pre-size the pending batch.
    ///
    /// # Errors
    /// If the allocation fails.
    pub fn reserve(&mut self, num_jobs: usize, storage_bytes: usize) -> Result<(), StorageError> {
        self.pool.reserve(num_jobs, storage_bytes)
    }

    /// Add a job to the pending batch.
    ///
    /// # Errors
    /// If the storage cannot grow.
    pub fn enqueue(&mut self, job: impl Job<A>) -> Result<(), StorageError> {
        self.instantiated = false;
        self.pool.enqueue(job)
    }

    /// Add a job calling `body(i, args)` for every `i` in `range`.
    ///
    /// # Errors
    /// If the storage cannot grow.
    pub fn enqueue_forall<F>(&mut self, range: Range<usize>, body: F) -> Result<(), StorageError>
    where
        F: Fn(usize, A) + Send + Sync + 'static,
    {
        self.instantiated = false;
        self.pool.enqueue_forall(range, body)
    }

    /// Arguments passed to every job on the next runs.
    pub fn set_args(&mut self, args: A) {
        self.args = args;
    }

    /// Turn the pending jobs into the group run by `exec`.
    ///
    /// No-op if nothing was enqueued since the last instantiation.
    pub fn instantiate(&mut self) {
        if !self.instantiated {
            self.instantiated = true;
            self.group = self.pool.instantiate();
        }
    }

    /// The group `exec` currently runs.
    #[must_use]
    pub fn group(&self) -> &WorkGroup<A, S, Rn> {
        &self.group
    }
}

impl<R, A, S, Rn> WorkItem<R> for WorkGroupNode<A, S, Rn>
where
    R: Resource,
    A: Copy + Send + Sync + 'static,
    S: WorkStorage<A>,
    S::Allocator: Clone,
    Rn: WorkRunner,
{
    fn exec(&mut self, resource: &R) -> R::Event {
        self.instantiate();
        self.group.run(self.args);
        resource.get_event()
    }
}

impl<A, S, Rn> fmt::Debug for WorkGroupNode<A, S, Rn>
where
    A: Copy + Send + Sync + fmt::Debug + 'static,
    S: WorkStorage<A> + fmt::Debug,
    Rn: WorkRunner + fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkGroupNode")
            .field("pool", &self.pool)
            .field("group", &self.group)
            .field("args", &self.args)
            .field("instantiated", &self.instantiated)
            .finish()
    }
}
