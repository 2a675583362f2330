use crate::work::{
    alloc::{Global, StorageError, WorkAllocator},
    storage::{Block, WorkStorage, checked_add, checked_mul},
    vtable::{self, Job, JobRef},
};
use core::{fmt, marker::PhantomData, ptr::NonNull};
use tracing::debug;

/// All records packed back to back in one buffer, each at its own offset.
///
/// Compact: a record takes exactly its own (rounded) size. When the buffer is
/// full it is reallocated with at least twice the capacity and every record
/// is relocated to the same offset in the new buffer.
pub struct RaggedArrayOfObjects<A: 'static, Al: WorkAllocator = Global> {
    offsets: Vec<usize>,
    block: Block,
    used: usize,
    allocator: Al,
    _marker: PhantomData<fn(A)>,
}

// SAFETY: every stored job is `Send + Sync` (see `Job`), and the storage
// exclusively owns its buffer.
unsafe impl<A: 'static, Al: WorkAllocator + Send> Send for RaggedArrayOfObjects<A, Al> {}
unsafe impl<A: 'static, Al: WorkAllocator + Sync> Sync for RaggedArrayOfObjects<A, Al> {}

impl<A: 'static> RaggedArrayOfObjects<A> {
    /// Empty storage on the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A: 'static> Default for RaggedArrayOfObjects<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, Al: WorkAllocator> RaggedArrayOfObjects<A, Al> {
    /// Bytes the current buffer can hold.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.block.bytes
    }

    fn array_reserve(&mut self, storage_bytes: usize) -> Result<(), StorageError> {
        if storage_bytes <= self.block.bytes {
            return Ok(());
        }
        let new_block = Block::allocate(&self.allocator, storage_bytes)?;
        debug!(
            from = self.block.bytes,
            to = storage_bytes,
            jobs = self.offsets.len(),
            "growing ragged work storage"
        );
        for &offset in &self.offsets {
            // SAFETY: every offset addresses a live record in the old block;
            // the same offset is in bounds of the bigger new block.
            unsafe { vtable::relocate::<A>(new_block.at(offset), self.block.at(offset)) };
        }
        // SAFETY: all records were relocated out of the old block.
        unsafe { self.block.release(&self.allocator) };
        self.block = new_block;
        Ok(())
    }

    fn destroy_all(&mut self) {
        while let Some(offset) = self.offsets.pop() {
            // SAFETY: `offset` addresses a live record that was just forgotten.
            unsafe { vtable::destroy_record::<A>(self.block.at(offset)) };
        }
        self.used = 0;
        // SAFETY: no live records remain.
        unsafe { self.block.release(&self.allocator) };
    }
}

impl<A: 'static, Al: WorkAllocator + Send + Sync> WorkStorage<A> for RaggedArrayOfObjects<A, Al> {
    type Allocator = Al;

    fn new_in(allocator: Al) -> Self {
        Self {
            offsets: Vec::new(),
            block: Block::EMPTY,
            used: 0,
            allocator,
            _marker: PhantomData,
        }
    }

    fn allocator(&self) -> &Al {
        &self.allocator
    }

    fn reserve(&mut self, num_jobs: usize, storage_bytes: usize) -> Result<(), StorageError> {
        let additional = num_jobs.saturating_sub(self.offsets.len());
        self.offsets.try_reserve(additional)?;
        self.array_reserve(vtable::round_up(storage_bytes))
    }

    fn emplace<T: Job<A>>(&mut self, job: T) -> Result<(), StorageError> {
        let size = vtable::record_size_of::<T, A>();
        let end = checked_add(self.used, size)?;
        self.offsets.try_reserve(1)?;
        if end > self.block.bytes {
            let doubled = checked_mul(self.block.bytes, 2)?;
            self.array_reserve(end.max(doubled))?;
        }
        let offset = self.used;
        // SAFETY: `offset` is `MAX_ALIGN`-aligned (all record sizes are
        // multiples of it) and `offset + size` fits in the block.
        unsafe { vtable::construct::<T, A>(self.block.at(offset), job) };
        self.offsets.push(offset);
        self.used = end;
        Ok(())
    }

    fn len(&self) -> usize {
        self.offsets.len()
    }

    fn storage_bytes(&self) -> usize {
        self.used
    }

    fn get(&self, index: usize) -> Option<JobRef<'_, A>> {
        let &offset = self.offsets.get(index)?;
        // SAFETY: the offset addresses a live record that stays untouched while
        // `self` is borrowed.
        Some(unsafe { JobRef::new(NonNull::new_unchecked(self.block.at(offset))) })
    }

    fn clear(&mut self) {
        self.destroy_all();
        self.offsets = Vec::new();
    }
}

impl<A: 'static, Al: WorkAllocator> Drop for RaggedArrayOfObjects<A, Al> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl<A: 'static, Al: WorkAllocator> fmt::Debug for RaggedArrayOfObjects<A, Al> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RaggedArrayOfObjects")
            .field("len", &self.offsets.len())
            .field("storage_bytes", &self.used)
            .field("capacity_bytes", &self.block.bytes)
            .finish_non_exhaustive()
    }
}
