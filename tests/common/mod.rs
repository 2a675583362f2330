#![allow(dead_code)]

use parking_lot::Mutex;
use std::{
    ptr::NonNull,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};
use workgraph::work::{Global, StorageError, WorkAllocator};

/// Route `tracing` output of the library to the test harness.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Append-only log shared between jobs or nodes.
#[derive(Debug, Clone, Default)]
pub struct Log<T>(Arc<Mutex<Vec<T>>>);

impl<T: Clone> Log<T> {
    pub fn new() -> Self {
        Self(Arc::new(Mutex::new(Vec::new())))
    }

    pub fn push(&self, value: T) {
        self.0.lock().push(value);
    }

    pub fn take(&self) -> Vec<T> {
        core::mem::take(&mut *self.0.lock())
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.0.lock().clone()
    }
}

/// Position of `value` in `log`.
pub fn position<T: PartialEq>(log: &[T], value: &T) -> usize {
    log.iter()
        .position(|item| item == value)
        .unwrap_or_else(|| panic!("value missing from log"))
}

/// Global allocator that refuses every allocation once its budget is spent.
#[derive(Debug, Clone)]
pub struct BudgetAllocator {
    budget: Arc<AtomicUsize>,
    live: Arc<AtomicUsize>,
}

impl BudgetAllocator {
    pub fn new(budget: usize) -> Self {
        Self {
            budget: Arc::new(AtomicUsize::new(budget)),
            live: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn set_budget(&self, budget: usize) {
        self.budget.store(budget, Ordering::SeqCst);
    }

    /// Blocks handed out and not yet returned.
    pub fn live(&self) -> usize {
        self.live.load(Ordering::SeqCst)
    }
}

// SAFETY: granted blocks come straight from `Global`.
unsafe impl WorkAllocator for BudgetAllocator {
    fn allocate(&self, bytes: usize) -> Result<NonNull<u8>, StorageError> {
        let granted = self
            .budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
            .is_ok();
        if !granted {
            return Err(StorageError::AllocFailed { bytes });
        }
        let ptr = Global.allocate(bytes)?;
        if bytes != 0 {
            self.live.fetch_add(1, Ordering::SeqCst);
        }
        Ok(ptr)
    }

    unsafe fn deallocate(&self, ptr: NonNull<u8>, bytes: usize) {
        if bytes != 0 {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
        unsafe { Global.deallocate(ptr, bytes) };
    }
}

/// Records its id into a shared log when dropped.
#[derive(Debug)]
pub struct DropTracker {
    pub id: usize,
    drops: Log<usize>,
}

impl DropTracker {
    pub fn new(id: usize, drops: &Log<usize>) -> Self {
        Self {
            id,
            drops: drops.clone(),
        }
    }
}

impl Drop for DropTracker {
    fn drop(&mut self) {
        self.drops.push(self.id);
    }
}
