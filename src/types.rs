use core::cell::UnsafeCell;
use derive_more::{Deref, DerefMut};
use indexmap::IndexSet as _IndexSet;
use rustc_hash::FxBuildHasher;

/// A minimal `UnsafeCell` wrapper that is `Sync` when `T: Send`.
///
/// Used by the task backends to hand out exclusive access to a node's work
/// item and scheduling layout from whichever pool thread runs the node.
/// Correctness is ensured by scheduling: every node runs at most once per
/// `exec`, so there are never two live accesses to the same slot.
#[derive(Debug, Deref, DerefMut)]
#[repr(transparent)]
pub(crate) struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T: Send> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub(crate) fn new(val: T) -> Self {
        Self(UnsafeCell::new(val))
    }
}

/// Identifier of a node in a [`Dag`](crate::dag::Dag).
///
/// Ids are dense slot indexes chosen by the caller when adding nodes.
pub type NodeId = usize;

pub(crate) type IndexSet<T> = _IndexSet<T, FxBuildHasher>;

/// Hash map with the fast non-cryptographic hasher used across the crate.
pub type HashMap<K, V> = std::collections::HashMap<K, V, FxBuildHasher>;
