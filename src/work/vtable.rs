use core::{
    fmt,
    marker::PhantomData,
    mem::{align_of, offset_of, size_of},
    ptr::NonNull,
};

/// Maximum alignment supported for stored jobs. Every record, and every
/// block handed out by a [`WorkAllocator`](crate::work::WorkAllocator), is
/// aligned to it.
pub const MAX_ALIGN: usize = 16;

/// Offset of the job object inside every record, whatever the job's size.
pub(crate) const OBJ_OFFSET: usize = size_of::<JobHeader<()>>();

/// A callable that can be type-erased into work storage.
///
/// Implemented for every `Fn(A)` closure that is `Send + Sync + 'static`.
pub trait Job<A>: Send + Sync + 'static {
    /// Run the job with this run's arguments.
    fn call(&self, args: A);
}

impl<A, F> Job<A> for F
where
    F: Fn(A) + Send + Sync + 'static,
{
    fn call(&self, args: A) {
        self(args);
    }
}

/// Per-type dispatch table for type-erased jobs.
///
/// One instance exists per concrete job type (see [`Vtable::of`]), shared by
/// every record of that type.
pub struct Vtable<A: 'static> {
    /// Move the object at `src` into uninitialized memory at `dest`. The
    /// source is left logically uninitialized and must not be destroyed.
    pub(crate) move_construct: unsafe fn(dest: *mut u8, src: *mut u8),
    pub(crate) call: unsafe fn(obj: *const u8, args: A),
    pub(crate) destroy: unsafe fn(obj: *mut u8),
    /// Bytes one record of this type occupies in storage.
    pub(crate) size: usize,
}

struct VtableOf<T, A>(PhantomData<fn(A) -> T>);

impl<T: Job<A>, A: 'static> VtableOf<T, A> {
    const VTABLE: &'static Vtable<A> = &Vtable {
        move_construct: move_construct::<T>,
        call: call::<T, A>,
        destroy: destroy::<T>,
        size: record_size::<T, A>(),
    };
}

impl<A: 'static> Vtable<A> {
    /// The vtable of job type `T`.
    #[must_use]
    pub fn of<T: Job<A>>() -> &'static Self {
        VtableOf::<T, A>::VTABLE
    }

    /// Bytes one record of this job type occupies in storage.
    #[must_use]
    pub fn size(&self) -> usize {
        self.size
    }
}

impl<A: 'static> fmt::Debug for Vtable<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Vtable")
            .field("size", &self.size)
            .finish_non_exhaustive()
    }
}

unsafe fn move_construct<T>(dest: *mut u8, src: *mut u8) {
    // SAFETY: both pointers address properly aligned `T` slots, `src` is
    // initialized and `dest` is not. Reading leaves `src` logically moved-from.
    unsafe { dest.cast::<T>().write(src.cast::<T>().read()) }
}

unsafe fn call<T: Job<A>, A>(obj: *const u8, args: A) {
    // SAFETY: `obj` addresses an initialized `T`.
    unsafe { (*obj.cast::<T>()).call(args) }
}

unsafe fn destroy<T>(obj: *mut u8) {
    // SAFETY: `obj` addresses an initialized `T` that is never used again.
    unsafe { obj.cast::<T>().drop_in_place() }
}

/// Fixed-layout prefix of every record.
///
/// `align(16)` pads the header to `MAX_ALIGN` on every target, which puts the
/// object at `OBJ_OFFSET` for any job type whose alignment does not exceed
/// `MAX_ALIGN`.
#[repr(C, align(16))]
pub(crate) struct JobHeader<A: 'static> {
    vtable: &'static Vtable<A>,
    call: unsafe fn(obj: *const u8, args: A),
}

#[repr(C)]
struct JobRecord<T, A: 'static> {
    header: JobHeader<A>,
    obj: T,
}

pub(crate) const fn round_up(bytes: usize) -> usize {
    bytes.next_multiple_of(MAX_ALIGN)
}

const fn record_size<T, A: 'static>() -> usize {
    round_up(size_of::<JobRecord<T, A>>())
}

/// Record size for job type `T`, as it will be laid out in storage.
pub(crate) fn record_size_of<T: Job<A>, A: 'static>() -> usize {
    Vtable::<A>::of::<T>().size
}

/// Construct a record for `job` at `ptr`.
///
/// # Safety
/// `ptr` must be aligned to `MAX_ALIGN` and valid for writes of
/// `record_size_of::<T, A>()` bytes.
pub(crate) unsafe fn construct<T: Job<A>, A: 'static>(ptr: *mut u8, job: T) {
    const {
        assert!(
            align_of::<T>() <= MAX_ALIGN,
            "job alignment exceeds MAX_ALIGN"
        );
    }
    debug_assert_eq!(offset_of!(JobRecord<T, A>, obj), OBJ_OFFSET);
    let vtable = Vtable::<A>::of::<T>();
    // SAFETY: guaranteed by the caller.
    unsafe {
        ptr.cast::<JobRecord<T, A>>().write(JobRecord {
            header: JobHeader {
                vtable,
                call: vtable.call,
            },
            obj: job,
        });
    }
}

/// Move the record at `src` to `dest` and leave `src` uninitialized.
///
/// # Safety
/// `src` must hold an initialized record, `dest` must be aligned and valid
/// for writes of that record's size, and the two must not overlap.
pub(crate) unsafe fn relocate<A: 'static>(dest: *mut u8, src: *mut u8) {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let header = src.cast::<JobHeader<A>>().read();
        let move_construct = header.vtable.move_construct;
        dest.cast::<JobHeader<A>>().write(header);
        move_construct(dest.add(OBJ_OFFSET), src.add(OBJ_OFFSET));
    }
}

/// Drop the job object of the record at `ptr`.
///
/// # Safety
/// `ptr` must hold an initialized record that is never used again.
pub(crate) unsafe fn destroy_record<A: 'static>(ptr: *mut u8) {
    // SAFETY: guaranteed by the caller.
    unsafe {
        let vtable = (*ptr.cast::<JobHeader<A>>()).vtable;
        (vtable.destroy)(ptr.add(OBJ_OFFSET));
    }
}

/// Size of the initialized record at `ptr`.
///
/// # Safety
/// `ptr` must hold an initialized record.
pub(crate) unsafe fn record_size_at<A: 'static>(ptr: *const u8) -> usize {
    unsafe { (*ptr.cast::<JobHeader<A>>()).vtable.size }
}

/// Generic read-only view of one stored job.
pub struct JobRef<'a, A: 'static> {
    ptr: NonNull<u8>,
    _marker: PhantomData<&'a JobHeader<A>>,
}

impl<A: 'static> Clone for JobRef<'_, A> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<A: 'static> Copy for JobRef<'_, A> {}

impl<'a, A: 'static> JobRef<'a, A> {
    /// # Safety
    /// `ptr` must hold an initialized record that outlives `'a` and is not
    /// mutated during `'a`.
    pub(crate) unsafe fn new(ptr: NonNull<u8>) -> Self {
        Self {
            ptr,
            _marker: PhantomData,
        }
    }

    fn header(&self) -> &'a JobHeader<A> {
        // SAFETY: upheld by `JobRef::new`.
        unsafe { self.ptr.cast::<JobHeader<A>>().as_ref() }
    }

    /// Invoke the stored job.
    pub fn call(self, args: A) {
        let call = self.header().call;
        // SAFETY: the record is initialized and the call pointer belongs to
        // its vtable.
        unsafe { call(self.ptr.as_ptr().add(OBJ_OFFSET), args) }
    }

    /// The job's vtable.
    #[must_use]
    pub fn vtable(&self) -> &'static Vtable<A> {
        self.header().vtable
    }

    /// Bytes this record occupies in storage.
    #[must_use]
    pub fn size(&self) -> usize {
        self.vtable().size
    }
}

impl<A: 'static> fmt::Debug for JobRef<'_, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobRef")
            .field("ptr", &self.ptr)
            .field("size", &self.size())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_pads_to_max_align() {
        assert_eq!(OBJ_OFFSET, MAX_ALIGN);
        assert_eq!(offset_of!(JobRecord<u8, u32>, obj), OBJ_OFFSET);
        assert_eq!(offset_of!(JobRecord<[u64; 8], ()>, obj), OBJ_OFFSET);
    }

    #[test]
    fn record_sizes_are_rounded() {
        let small = |(): ()| {};
        let payload = [0u8; 64];
        let large = move |(): ()| {
            core::hint::black_box(&payload);
        };
        assert_eq!(Vtable::<()>::of::<fn(())>().size % MAX_ALIGN, 0);
        assert_eq!(size_of_job(&small), OBJ_OFFSET);
        assert_eq!(size_of_job(&large), OBJ_OFFSET + 64);
    }

    fn size_of_job<T: Job<()>>(_: &T) -> usize {
        record_size_of::<T, ()>()
    }
}
