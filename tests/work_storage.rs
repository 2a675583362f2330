#![allow(missing_docs)]

mod common;

use common::{BudgetAllocator, DropTracker, Log};
use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
};
use workgraph::work::{
    ArrayOfPointers, ConstantStrideArrayOfObjects, Ordered, RaggedArrayOfObjects, Reverse,
    StorageError, Unordered, WorkPool, WorkRunner, WorkStorage,
};

/// Enqueue job `id` as one of three differently sized closure types. Every
/// variant logs `(id, args)` when called.
fn enqueue_job<S: WorkStorage<usize>>(
    storage: &mut S,
    id: usize,
    log: &Log<(usize, usize)>,
) -> Result<(), StorageError> {
    let log = log.clone();
    match id % 3 {
        0 => storage.emplace(move |args: usize| log.push((id, args))),
        1 => {
            let payload = [id as u64; 8];
            storage.emplace(move |args: usize| {
                let id = usize::try_from(payload[7]).unwrap();
                log.push((id, args));
            })
        }
        _ => {
            let name = id.to_string();
            storage.emplace(move |args: usize| log.push((name.parse().unwrap(), args)))
        }
    }
}

fn ids(log: &[(usize, usize)]) -> Vec<usize> {
    log.iter().map(|&(id, _)| id).collect()
}

fn ordered_and_reverse_runners<S: WorkStorage<usize> + Default>() {
    common::init_tracing();
    let log = Log::new();
    let mut storage = S::default();
    Ordered.run(&storage, 0);
    assert!(log.take().is_empty());

    for id in 0..10 {
        enqueue_job(&mut storage, id, &log).unwrap();
    }
    assert_eq!(storage.len(), 10);

    Ordered.run(&storage, 3);
    let forward = log.take();
    assert_eq!(ids(&forward), (0..10).collect::<Vec<_>>());
    assert!(forward.iter().all(|&(_, args)| args == 3));

    Reverse.run(&storage, 4);
    assert_eq!(ids(&log.take()), (0..10).rev().collect::<Vec<_>>());
}

fn growth_preserves_contents<S: WorkStorage<usize> + Default>() {
    common::init_tracing();
    let log = Log::new();
    let mut storage = S::default();
    storage.reserve(2, 64).unwrap();
    for id in 0..40 {
        enqueue_job(&mut storage, id, &log).unwrap();
        Ordered.run(&storage, id);
        let expected: Vec<_> = (0..=id).map(|prev| (prev, id)).collect();
        assert_eq!(log.take(), expected);
    }
    let sizes: usize = storage.iter().map(|job| job.size()).sum();
    assert!(storage.storage_bytes() >= sizes);
}

fn drops_each_job_once_in_reverse<S: WorkStorage<usize> + Default>() {
    let drops = Log::new();
    let mut storage = S::default();
    for id in 0..20 {
        let tracker = DropTracker::new(id, &drops);
        if id % 2 == 0 {
            storage
                .emplace(move |_: usize| {
                    core::hint::black_box(&tracker);
                })
                .unwrap();
        } else {
            let padding = [0u8; 48];
            storage
                .emplace(move |_: usize| {
                    core::hint::black_box((&tracker, &padding));
                })
                .unwrap();
        }
    }
    // Growing relocates jobs, it never drops them.
    assert!(drops.snapshot().is_empty());
    Ordered.run(&storage, 0);
    assert!(drops.snapshot().is_empty());

    drop(storage);
    assert_eq!(drops.take(), (0..20).rev().collect::<Vec<_>>());
}

fn clear_destroys_and_resets<S: WorkStorage<usize> + Default>() {
    let drops = Log::new();
    let mut storage = S::default();
    for id in 0..5 {
        let tracker = DropTracker::new(id, &drops);
        storage
            .emplace(move |_: usize| {
                core::hint::black_box(&tracker);
            })
            .unwrap();
    }
    storage.clear();
    assert_eq!(drops.take(), [4, 3, 2, 1, 0]);
    assert!(storage.is_empty());
    assert_eq!(storage.storage_bytes(), 0);

    let log = Log::new();
    enqueue_job(&mut storage, 1, &log).unwrap();
    Ordered.run(&storage, 9);
    assert_eq!(log.take(), [(1, 9)]);
}

fn allocation_failure_leaves_state_intact<S>()
where
    S: WorkStorage<usize, Allocator = BudgetAllocator>,
{
    let allocator = BudgetAllocator::new(3);
    let log = Log::new();
    let mut storage = S::new_in(allocator.clone());
    let mut failure = None;
    for id in 0..1000 {
        if let Err(err) = enqueue_job(&mut storage, id, &log) {
            failure = Some((id, err));
            break;
        }
    }
    let (failed_id, err) = failure.expect("budget must run out");
    assert!(matches!(err, StorageError::AllocFailed { .. }));
    assert_eq!(storage.len(), failed_id);

    Ordered.run(&storage, 1);
    let expected: Vec<_> = (0..failed_id).map(|id| (id, 1)).collect();
    assert_eq!(log.take(), expected);

    allocator.set_budget(usize::MAX);
    enqueue_job(&mut storage, failed_id, &log).unwrap();
    Ordered.run(&storage, 2);
    let expected: Vec<_> = (0..=failed_id).map(|id| (id, 2)).collect();
    assert_eq!(log.take(), expected);

    drop(storage);
    assert_eq!(allocator.live(), 0);
}

fn runs_are_idempotent<S: WorkStorage<usize> + Default>() {
    let log = Log::new();
    let mut storage = S::default();
    for id in 0..7 {
        enqueue_job(&mut storage, id, &log).unwrap();
    }
    Ordered.run(&storage, 5);
    let first = log.take();
    Ordered.run(&storage, 5);
    assert_eq!(log.take(), first);
    assert_eq!(storage.len(), 7);
}

fn unordered_runs_each_job_once<S: WorkStorage<usize> + Default>() {
    let counts: Arc<Vec<AtomicUsize>> = Arc::new((0..64).map(|_| AtomicUsize::new(0)).collect());
    let mut storage = S::default();
    for id in 0..64 {
        let counts = Arc::clone(&counts);
        storage
            .emplace(move |args: usize| {
                counts[id].fetch_add(args, Ordering::Relaxed);
            })
            .unwrap();
    }
    Unordered.run(&storage, 1);
    Unordered.run(&storage, 1);
    assert!(counts.iter().all(|count| count.load(Ordering::Relaxed) == 2));
}

fn iterator_is_random_access<S: WorkStorage<usize> + Default>() {
    let log = Log::new();
    let mut storage = S::default();
    for id in 0..6 {
        enqueue_job(&mut storage, id, &log).unwrap();
    }
    let mut iter = storage.iter();
    assert_eq!(iter.len(), 6);
    iter.nth(1).unwrap().call(0);
    iter.next_back().unwrap().call(0);
    iter.nth_back(1).unwrap().call(0);
    assert_eq!(iter.len(), 1);
    iter.next().unwrap().call(0);
    assert!(iter.next().is_none());
    assert_eq!(ids(&log.take()), [1, 5, 3, 2]);
    assert!(storage.get(6).is_none());
}

macro_rules! storage_tests {
    ($($module:ident => $storage:ident),* $(,)?) => {
        $(
            mod $module {
                use super::*;

                #[test]
                fn ordered_and_reverse_runners() {
                    super::ordered_and_reverse_runners::<$storage<usize>>();
                }

                #[test]
                fn growth_preserves_contents() {
                    super::growth_preserves_contents::<$storage<usize>>();
                }

                #[test]
                fn drops_each_job_once_in_reverse() {
                    super::drops_each_job_once_in_reverse::<$storage<usize>>();
                }

                #[test]
                fn clear_destroys_and_resets() {
                    super::clear_destroys_and_resets::<$storage<usize>>();
                }

                #[test]
                fn allocation_failure_leaves_state_intact() {
                    super::allocation_failure_leaves_state_intact::<
                        $storage<usize, BudgetAllocator>,
                    >();
                }

                #[test]
                fn runs_are_idempotent() {
                    super::runs_are_idempotent::<$storage<usize>>();
                }

                #[test]
                fn unordered_runs_each_job_once() {
                    super::unordered_runs_each_job_once::<$storage<usize>>();
                }

                #[test]
                fn iterator_is_random_access() {
                    super::iterator_is_random_access::<$storage<usize>>();
                }
            }
        )*
    };
}

storage_tests! {
    array_of_pointers => ArrayOfPointers,
    ragged_array_of_objects => RaggedArrayOfObjects,
    constant_stride_array_of_objects => ConstantStrideArrayOfObjects,
}

#[test]
fn stride_grows_to_biggest_job() {
    common::init_tracing();
    let log = Log::new();
    let mut storage = ConstantStrideArrayOfObjects::<usize>::new();
    let small = |value: u64| {
        let log = log.clone();
        move |_: usize| log.push(value)
    };
    storage.emplace(small(1)).unwrap();
    storage.emplace(small(2)).unwrap();
    let small_stride = storage.stride();

    let payload = [3u64; 8];
    let big_log = log.clone();
    storage
        .emplace(move |_: usize| big_log.push(payload.iter().sum()))
        .unwrap();
    assert!(storage.stride() >= 64);
    assert!(storage.stride() > small_stride);

    storage.emplace(small(4)).unwrap();
    assert_eq!(storage.len(), 4);
    assert_eq!(storage.storage_bytes(), 4 * storage.stride());
    assert!(storage.iter().all(|job| job.size() <= storage.stride()));

    Ordered.run(&storage, 0);
    assert_eq!(log.take(), [1, 2, 24, 4]);
}

#[test]
fn pool_batches_become_groups() {
    let log = Log::new();
    let mut pool = WorkPool::<usize>::new();
    let first = log.clone();
    pool.enqueue(move |args: usize| first.push(args)).unwrap();
    let each = log.clone();
    pool.enqueue_forall(0..3, move |idx, args| each.push(idx * 10 + args))
        .unwrap();
    assert_eq!(pool.num_jobs(), 2);

    let group = pool.instantiate();
    assert_eq!(pool.num_jobs(), 0);
    assert_eq!(pool.storage_bytes(), 0);
    assert_eq!(group.len(), 2);

    group.run(1);
    group.run(2);
    assert_eq!(log.take(), [1, 1, 11, 21, 2, 2, 12, 22]);

    let next = log.clone();
    pool.enqueue(move |args: usize| next.push(args + 100)).unwrap();
    let second = pool.instantiate();
    second.run(0);
    group.run(0);
    assert_eq!(log.take(), [100, 0, 0, 10, 20]);
}

#[test]
fn reverse_pool_runs_backwards() {
    let log = Log::new();
    let mut pool = WorkPool::<usize, ArrayOfPointers<usize>, Reverse>::new();
    for id in 0..4 {
        let log = log.clone();
        pool.enqueue(move |_: usize| log.push(id)).unwrap();
    }
    pool.instantiate().run(0);
    assert_eq!(log.take(), [3, 2, 1, 0]);
}

type BudgetStride = ConstantStrideArrayOfObjects<usize, BudgetAllocator>;

fn logging_job(id: usize, log: &Log<(usize, usize)>) -> impl Fn(usize) + Send + Sync + 'static {
    let log = log.clone();
    move |args: usize| log.push((id, args))
}

#[test]
fn stride_reserve_covers_first_jobs() {
    let allocator = BudgetAllocator::new(1);
    let log = Log::new();
    let mut storage = BudgetStride::new_in(allocator.clone());
    storage.reserve(4, 128).unwrap();
    assert_eq!(storage.capacity_bytes(), 128);

    allocator.set_budget(0);
    for id in 0..4 {
        storage.emplace(logging_job(id, &log)).unwrap();
    }
    assert!(storage.stride() > 0);
    assert_eq!(storage.capacity_bytes(), 128);
    Ordered.run(&storage, 7);
    assert_eq!(log.take(), [(0, 7), (1, 7), (2, 7), (3, 7)]);
}

#[test]
fn stride_survives_clear() {
    let allocator = BudgetAllocator::new(usize::MAX);
    let log = Log::new();
    let mut storage = BudgetStride::new_in(allocator.clone());
    storage.emplace(logging_job(0, &log)).unwrap();
    let stride = storage.stride();
    storage.clear();
    assert_eq!(storage.stride(), stride);
    assert_eq!(storage.capacity_bytes(), 0);

    allocator.set_budget(1);
    storage.reserve(2, 0).unwrap();
    assert_eq!(storage.capacity_bytes(), 2 * stride);
    for id in 1..3 {
        storage.emplace(logging_job(id, &log)).unwrap();
    }
    Ordered.run(&storage, 0);
    assert_eq!(log.take(), [(1, 0), (2, 0)]);
}

#[test]
fn stride_pool_batches_allocate_once() {
    let allocator = BudgetAllocator::new(usize::MAX);
    let log = Log::new();
    let mut pool = WorkPool::<usize, BudgetStride>::new_in(allocator.clone());
    for id in 0..4 {
        pool.enqueue(logging_job(id, &log)).unwrap();
    }
    let first = pool.instantiate();

    // The next batch of the same shape fits the single reservation made on
    // its first enqueue.
    allocator.set_budget(1);
    for id in 4..8 {
        pool.enqueue(logging_job(id, &log)).unwrap();
    }
    let second = pool.instantiate();
    assert_eq!(second.storage().stride(), first.storage().stride());

    first.run(1);
    second.run(2);
    let expected: Vec<_> = (0..4).map(|id| (id, 1)).chain((4..8).map(|id| (id, 2))).collect();
    assert_eq!(log.take(), expected);
}
