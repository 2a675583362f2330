mod pointers;
mod ragged;
mod stride;

pub use crate::work::storage::{
    pointers::ArrayOfPointers, ragged::RaggedArrayOfObjects, stride::ConstantStrideArrayOfObjects,
};
use crate::work::{
    alloc::{StorageError, WorkAllocator},
    vtable::{Job, JobRef},
};
use core::iter::FusedIterator;

/// Append-only container of type-erased jobs called with arguments `A`.
///
/// All layout policies share this contract:
/// - jobs keep their enqueue order and are reachable by index;
/// - growing the backing memory relocates existing jobs through their
///   vtables, and a failed allocation leaves every stored job untouched;
/// - dropping the storage destroys the remaining jobs in reverse enqueue
///   order before the memory is released.
pub trait WorkStorage<A: 'static>: Send + Sync + Sized {
    /// Memory provider of this storage.
    type Allocator: WorkAllocator;

    /// Empty storage that allocates through `allocator`.
    fn new_in(allocator: Self::Allocator) -> Self;

    /// The allocator this storage was built with.
    fn allocator(&self) -> &Self::Allocator;

    /// Empty storage on a clone of this one's allocator.
    ///
    /// Policies carrying layout state across batches (the record stride)
    /// hand it over, so the new storage takes the same jobs without
    /// relaying them out.
    fn empty_like(&self) -> Self
    where
        Self::Allocator: Clone,
    {
        Self::new_in(self.allocator().clone())
    }

    /// Pre-size for `num_jobs` jobs occupying `storage_bytes` in total.
    ///
    /// Only a performance hint; each policy uses the parts that matter to it.
    ///
    /// # Errors
    /// If the allocation fails. Nothing is changed in that case.
    fn reserve(&mut self, num_jobs: usize, storage_bytes: usize) -> Result<(), StorageError>;

    /// Type-erase `job` into the next slot.
    ///
    /// # Errors
    /// If growing the storage fails. Nothing is changed in that case.
    fn emplace<T: Job<A>>(&mut self, job: T) -> Result<(), StorageError>;

    /// Number of stored jobs.
    fn len(&self) -> usize;

    /// Whether no job is stored.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes occupied by stored records.
    fn storage_bytes(&self) -> usize;

    /// The `index`-th job in enqueue order.
    fn get(&self, index: usize) -> Option<JobRef<'_, A>>;

    /// Iterate over stored jobs in enqueue order. Reverse with `.rev()`.
    fn iter(&self) -> Iter<'_, A, Self> {
        Iter {
            storage: self,
            front: 0,
            back: self.len(),
            _marker: core::marker::PhantomData,
        }
    }

    /// Destroy every stored job in reverse enqueue order and release memory.
    ///
    /// Layout state that does not depend on memory, such as the record
    /// stride, is kept for the next jobs.
    fn clear(&mut self);
}

/// Random-access iterator over a [`WorkStorage`].
#[derive(Debug)]
pub struct Iter<'a, A: 'static, S> {
    storage: &'a S,
    front: usize,
    back: usize,
    _marker: core::marker::PhantomData<fn(A)>,
}

impl<A: 'static, S> Clone for Iter<'_, A, S> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage,
            front: self.front,
            back: self.back,
            _marker: core::marker::PhantomData,
        }
    }
}

impl<'a, A: 'static, S: WorkStorage<A>> Iterator for Iter<'a, A, S> {
    type Item = JobRef<'a, A>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        let item = self.storage.get(self.front);
        self.front += 1;
        item
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let len = self.back - self.front;
        (len, Some(len))
    }

    fn nth(&mut self, n: usize) -> Option<Self::Item> {
        self.front = self.front.saturating_add(n).min(self.back);
        self.next()
    }
}

impl<A: 'static, S: WorkStorage<A>> DoubleEndedIterator for Iter<'_, A, S> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.front == self.back {
            return None;
        }
        self.back -= 1;
        self.storage.get(self.back)
    }

    fn nth_back(&mut self, n: usize) -> Option<Self::Item> {
        self.back = self.back.saturating_sub(n).max(self.front);
        self.next_back()
    }
}

impl<A: 'static, S: WorkStorage<A>> ExactSizeIterator for Iter<'_, A, S> {}

impl<A: 'static, S: WorkStorage<A>> FusedIterator for Iter<'_, A, S> {}

/// A single block from a [`WorkAllocator`] plus its size.
///
/// Shared by the two policies that pack records into one buffer.
#[derive(Debug)]
struct Block {
    ptr: core::ptr::NonNull<u8>,
    bytes: usize,
}

impl Block {
    const EMPTY: Self = Self {
        ptr: core::ptr::NonNull::dangling(),
        bytes: 0,
    };

    fn allocate(allocator: &impl WorkAllocator, bytes: usize) -> Result<Self, StorageError> {
        Ok(Self {
            ptr: allocator.allocate(bytes)?,
            bytes,
        })
    }

    fn at(&self, offset: usize) -> *mut u8 {
        // SAFETY: callers only pass offsets inside the block.
        unsafe { self.ptr.as_ptr().add(offset) }
    }

    /// # Safety
    /// The block must have been allocated by `allocator` and hold no live
    /// records anymore.
    unsafe fn release(&mut self, allocator: &impl WorkAllocator) {
        let block = core::mem::replace(self, Self::EMPTY);
        if block.bytes != 0 {
            unsafe { allocator.deallocate(block.ptr, block.bytes) };
        }
    }
}

fn checked_add(lhs: usize, rhs: usize) -> Result<usize, StorageError> {
    lhs.checked_add(rhs).ok_or(StorageError::CapacityOverflow)
}

fn checked_mul(lhs: usize, rhs: usize) -> Result<usize, StorageError> {
    lhs.checked_mul(rhs).ok_or(StorageError::CapacityOverflow)
}
