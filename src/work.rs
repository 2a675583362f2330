mod alloc;
mod group;
mod runner;
mod storage;
mod vtable;

pub use crate::work::{
    alloc::{Global, StorageError, WorkAllocator},
    group::{WorkGroup, WorkPool},
    runner::{Ordered, Reverse, Unordered, WorkRunner},
    storage::{
        ArrayOfPointers, ConstantStrideArrayOfObjects, Iter, RaggedArrayOfObjects, WorkStorage,
    },
    vtable::{Job, JobRef, MAX_ALIGN, Vtable},
};
