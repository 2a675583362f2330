use crate::work::{
    alloc::{Global, StorageError, WorkAllocator},
    storage::{WorkStorage, checked_add},
    vtable::{self, Job, JobRef},
};
use core::{fmt, marker::PhantomData, ptr::NonNull};

/// Every job in its own allocation; the storage keeps a list of pointers.
///
/// Growing only grows the pointer list, records never move once built. Cheap
/// to grow, poor locality when running.
pub struct ArrayOfPointers<A: 'static, Al: WorkAllocator = Global> {
    records: Vec<NonNull<u8>>,
    storage_bytes: usize,
    allocator: Al,
    _marker: PhantomData<fn(A)>,
}

// SAFETY: every stored job is `Send + Sync` (see `Job`), and the storage
// exclusively owns its records.
unsafe impl<A: 'static, Al: WorkAllocator + Send> Send for ArrayOfPointers<A, Al> {}
unsafe impl<A: 'static, Al: WorkAllocator + Sync> Sync for ArrayOfPointers<A, Al> {}

impl<A: 'static> ArrayOfPointers<A> {
    /// Empty storage on the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A: 'static> Default for ArrayOfPointers<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, Al: WorkAllocator + Send + Sync> WorkStorage<A> for ArrayOfPointers<A, Al> {
    type Allocator = Al;

    fn new_in(allocator: Al) -> Self {
        Self {
            records: Vec::new(),
            storage_bytes: 0,
            allocator,
            _marker: PhantomData,
        }
    }

    fn allocator(&self) -> &Al {
        &self.allocator
    }

    fn reserve(&mut self, num_jobs: usize, _storage_bytes: usize) -> Result<(), StorageError> {
        let additional = num_jobs.saturating_sub(self.records.len());
        self.records.try_reserve(additional)?;
        Ok(())
    }

    fn emplace<T: Job<A>>(&mut self, job: T) -> Result<(), StorageError> {
        let size = vtable::record_size_of::<T, A>();
        let storage_bytes = checked_add(self.storage_bytes, size)?;
        self.records.try_reserve(1)?;
        let ptr = self.allocator.allocate(size)?;
        // SAFETY: `ptr` is a fresh `MAX_ALIGN`-aligned block of `size` bytes.
        unsafe { vtable::construct::<T, A>(ptr.as_ptr(), job) };
        self.records.push(ptr);
        self.storage_bytes = storage_bytes;
        Ok(())
    }

    fn len(&self) -> usize {
        self.records.len()
    }

    fn storage_bytes(&self) -> usize {
        self.storage_bytes
    }

    fn get(&self, index: usize) -> Option<JobRef<'_, A>> {
        let &ptr = self.records.get(index)?;
        // SAFETY: the record stays alive and untouched while `self` is borrowed.
        Some(unsafe { JobRef::new(ptr) })
    }

    fn clear(&mut self) {
        self.destroy_all();
        self.records = Vec::new();
        self.storage_bytes = 0;
    }
}

impl<A: 'static, Al: WorkAllocator> ArrayOfPointers<A, Al> {
    fn destroy_all(&mut self) {
        while let Some(ptr) = self.records.pop() {
            // SAFETY: the record was built by `emplace` and was just removed
            // from the list, so nothing references it anymore.
            unsafe {
                let size = vtable::record_size_at::<A>(ptr.as_ptr());
                vtable::destroy_record::<A>(ptr.as_ptr());
                self.allocator.deallocate(ptr, size);
            }
        }
    }
}

impl<A: 'static, Al: WorkAllocator> Drop for ArrayOfPointers<A, Al> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl<A: 'static, Al: WorkAllocator> fmt::Debug for ArrayOfPointers<A, Al> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ArrayOfPointers")
            .field("len", &self.records.len())
            .field("storage_bytes", &self.storage_bytes)
            .finish_non_exhaustive()
    }
}
