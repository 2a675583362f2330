use crate::work::{
    alloc::{Global, StorageError, WorkAllocator},
    storage::{Block, WorkStorage, checked_add, checked_mul},
    vtable::{self, Job, JobRef},
};
use core::{fmt, marker::PhantomData, ptr::NonNull};
use tracing::debug;

/// All records in one buffer, every record occupying the same stride.
///
/// The stride is the biggest record size seen so far. Iteration is a plain
/// pointer bump, the best locality of the three layouts. The price is a
/// re-stride, relocating every record, whenever a job bigger than the current
/// stride is enqueued.
pub struct ConstantStrideArrayOfObjects<A: 'static, Al: WorkAllocator = Global> {
    block: Block,
    stride: usize,
    len: usize,
    allocator: Al,
    _marker: PhantomData<fn(A)>,
}

// SAFETY: every stored job is `Send + Sync` (see `Job`), and the storage
// exclusively owns its buffer.
unsafe impl<A: 'static, Al: WorkAllocator + Send> Send for ConstantStrideArrayOfObjects<A, Al> {}
unsafe impl<A: 'static, Al: WorkAllocator + Sync> Sync for ConstantStrideArrayOfObjects<A, Al> {}

impl<A: 'static> ConstantStrideArrayOfObjects<A> {
    /// Empty storage on the global allocator.
    #[must_use]
    pub fn new() -> Self {
        Self::new_in(Global)
    }
}

impl<A: 'static> Default for ConstantStrideArrayOfObjects<A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<A: 'static, Al: WorkAllocator> ConstantStrideArrayOfObjects<A, Al> {
    /// Bytes every record currently occupies.
    ///
    /// Zero until the first job. It only grows: [`clear`](WorkStorage::clear)
    /// and [`empty_like`](WorkStorage::empty_like) keep it.
    #[must_use]
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Bytes the current buffer can hold.
    #[must_use]
    pub fn capacity_bytes(&self) -> usize {
        self.block.bytes
    }

    /// Reallocate to `storage_bytes` with records `new_stride` apart.
    ///
    /// No-op unless the buffer is too small or the stride grows. An empty
    /// storage adopts a bigger stride in place when the buffer fits.
    fn array_reserve(&mut self, storage_bytes: usize, new_stride: usize) -> Result<(), StorageError> {
        if storage_bytes <= self.block.bytes && (new_stride <= self.stride || self.len == 0) {
            self.stride = self.stride.max(new_stride);
            return Ok(());
        }
        let storage_bytes = storage_bytes.max(checked_mul(self.len, new_stride)?);
        let new_block = Block::allocate(&self.allocator, storage_bytes)?;
        if new_stride != self.stride && self.len != 0 {
            debug!(
                from = self.stride,
                to = new_stride,
                jobs = self.len,
                "re-striding work storage"
            );
        }
        for idx in 0..self.len {
            // SAFETY: `idx * stride` addresses a live record in the old block and
            // `idx * new_stride` a free slot of at least `new_stride` bytes in the
            // new one.
            unsafe {
                vtable::relocate::<A>(
                    new_block.at(idx * new_stride),
                    self.block.at(idx * self.stride),
                );
            }
        }
        // SAFETY: all records were relocated out of the old block.
        unsafe { self.block.release(&self.allocator) };
        self.block = new_block;
        self.stride = new_stride;
        Ok(())
    }

    fn destroy_all(&mut self) {
        while self.len > 0 {
            self.len -= 1;
            // SAFETY: the slot holds a live record that was just forgotten.
            unsafe { vtable::destroy_record::<A>(self.block.at(self.len * self.stride)) };
        }
        // SAFETY: no live records remain.
        unsafe { self.block.release(&self.allocator) };
    }
}

impl<A: 'static, Al: WorkAllocator + Send + Sync> WorkStorage<A>
    for ConstantStrideArrayOfObjects<A, Al>
{
    type Allocator = Al;

    fn new_in(allocator: Al) -> Self {
        Self {
            block: Block::EMPTY,
            stride: 0,
            len: 0,
            allocator,
            _marker: PhantomData,
        }
    }

    fn allocator(&self) -> &Al {
        &self.allocator
    }

    fn empty_like(&self) -> Self
    where
        Self::Allocator: Clone,
    {
        let mut storage = Self::new_in(self.allocator().clone());
        storage.stride = self.stride;
        storage
    }

    fn reserve(&mut self, num_jobs: usize, storage_bytes: usize) -> Result<(), StorageError> {
        let by_count = checked_mul(num_jobs, self.stride)?;
        self.array_reserve(vtable::round_up(storage_bytes).max(by_count), self.stride)
    }

    fn emplace<T: Job<A>>(&mut self, job: T) -> Result<(), StorageError> {
        let size = vtable::record_size_of::<T, A>();
        let count = checked_add(self.len, 1)?;
        if size > self.stride {
            let restrided = checked_mul(count, size)?.max(self.block.bytes);
            self.array_reserve(restrided, size)?;
        } else {
            let end = checked_mul(count, self.stride)?;
            if end > self.block.bytes {
                let doubled = checked_mul(self.block.bytes, 2)?;
                self.array_reserve(end.max(doubled), self.stride)?;
            }
        }
        // SAFETY: the slot at `len * stride` is free, `MAX_ALIGN`-aligned and
        // `stride >= size` bytes long.
        unsafe { vtable::construct::<T, A>(self.block.at(self.len * self.stride), job) };
        self.len = count;
        Ok(())
    }

    fn len(&self) -> usize {
        self.len
    }

    fn storage_bytes(&self) -> usize {
        self.len * self.stride
    }

    fn get(&self, index: usize) -> Option<JobRef<'_, A>> {
        if index >= self.len {
            return None;
        }
        // SAFETY: the slot holds a live record that stays untouched while
        // `self` is borrowed.
        Some(unsafe { JobRef::new(NonNull::new_unchecked(self.block.at(index * self.stride))) })
    }

    fn clear(&mut self) {
        self.destroy_all();
    }
}

impl<A: 'static, Al: WorkAllocator> Drop for ConstantStrideArrayOfObjects<A, Al> {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

impl<A: 'static, Al: WorkAllocator> fmt::Debug for ConstantStrideArrayOfObjects<A, Al> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstantStrideArrayOfObjects")
            .field("len", &self.len)
            .field("stride", &self.stride)
            .field("capacity_bytes", &self.block.bytes)
            .finish_non_exhaustive()
    }
}
