use crate::work::vtable::MAX_ALIGN;
use std::{
    alloc::{self, Layout},
    collections::TryReserveError,
    ptr::NonNull,
};
use thiserror::Error;

/// Error returned by work storage operations that need memory.
///
/// Whenever one of these is returned, the storage is left exactly as it was
/// before the failing call.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum StorageError {
    /// The allocator could not provide a block of the requested size.
    #[error("allocation of {bytes} bytes failed")]
    AllocFailed {
        /// Requested block size.
        bytes: usize,
    },
    /// A size computation overflowed `usize`.
    #[error("work storage size overflow")]
    CapacityOverflow,
    /// Growing a bookkeeping vector failed.
    #[error(transparent)]
    Reserve(#[from] TryReserveError),
}

/// Raw memory provider for work storage.
///
/// The allocator never constructs or drops anything in the blocks it hands
/// out.
///
/// # Safety
/// Storages write job records straight into the blocks, so implementors must
/// guarantee that every `Ok` returned by [`allocate(bytes)`](Self::allocate)
/// with `bytes != 0` points to a block that:
/// - is aligned to [`MAX_ALIGN`];
/// - is valid for reads and writes of `bytes` bytes;
/// - stays valid and unaliased until passed back to `deallocate`.
///
/// Implementing it without `unsafe` is rejected:
///
/// ```compile_fail,E0200
/// use std::ptr::NonNull;
/// use workgraph::work::{StorageError, WorkAllocator};
///
/// struct Dangling;
///
/// impl WorkAllocator for Dangling {
///     fn allocate(&self, _bytes: usize) -> Result<NonNull<u8>, StorageError> {
///         Ok(NonNull::dangling())
///     }
///
///     unsafe fn deallocate(&self, _ptr: NonNull<u8>, _bytes: usize) {}
/// }
/// ```
pub unsafe trait WorkAllocator {
    /// Allocate `bytes` bytes aligned to `MAX_ALIGN`.
    ///
    /// # Errors
    /// If the memory cannot be provided.
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, StorageError>;

    /// Return a block to the allocator.
    ///
    /// # Safety
    /// `ptr` must come from `allocate(bytes)` on this allocator (or a clone of
    /// it) and must not be used afterwards.
    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize);
}

/// The global Rust allocator.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Global;

// SAFETY: blocks come from the global allocator with a `MAX_ALIGN` layout of
// exactly `bytes` bytes.
unsafe impl WorkAllocator for Global {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, StorageError> {
        if bytes == 0 {
            return Ok(NonNull::dangling());
        }
        let layout =
            Layout::from_size_align(bytes, MAX_ALIGN).map_err(|_| StorageError::CapacityOverflow)?;
        // SAFETY: `layout` has a non-zero size.
        let ptr = unsafe { alloc::alloc(layout) };
        NonNull::new(ptr).ok_or(StorageError::AllocFailed { bytes })
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes == 0 {
            return;
        }
        // SAFETY: the caller guarantees `ptr` came from `allocate(bytes)`, which
        // used exactly this layout.
        unsafe {
            alloc::dealloc(
                ptr.as_ptr(),
                Layout::from_size_align_unchecked(bytes, MAX_ALIGN),
            );
        }
    }
}

// SAFETY: forwards to `Al`, which upholds the contract.
unsafe impl<Al: WorkAllocator + ?Sized> WorkAllocator for &Al {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, StorageError> {
        (**self).allocate(bytes)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) {
        unsafe { (**self).deallocate(ptr, bytes) }
    }
}
