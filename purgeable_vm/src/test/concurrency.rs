use std::{
    sync::atomic::{AtomicBool, Ordering},
    thread,
};

use rand::{rngs::SmallRng, Rng, SeedableRng};

use super::{get_test_manager, new_object, TestHandle, TestManager};
use crate::{modules::ledger::LedgerEntry, DiscardOrder, OwnerId};

const WORKERS: u64 = 4;
const OBJECTS_PER_WORKER: usize = 16;
const ITERATIONS: usize = 2000;

fn worker(manager: &TestManager, owner: OwnerId, seed: u64) {
    let mut rand = SmallRng::seed_from_u64(seed);
    let objects: Vec<TestHandle> = (0..OBJECTS_PER_WORKER)
        .map(|_| new_object(manager, rand.gen_range(1..32), owner))
        .collect();

    for _ in 0..ITERATIONS {
        let handle = &objects[rand.gen_range(0..objects.len())];
        match rand.gen_range(0..10) {
            0..=3 => {
                let order = match rand.gen_range(0..3) {
                    0 => DiscardOrder::Obsolete,
                    1 => DiscardOrder::Fifo,
                    _ => DiscardOrder::Lifo,
                };
                let guard = handle.lock();
                manager
                    .make_volatile(&guard, order, rand.gen_range(0..8), rand.gen_bool(0.5))
                    .unwrap();
            }
            4..=5 => {
                let guard = handle.lock();
                manager.make_nonvolatile(&guard).unwrap();
            }
            6..=7 => manager.note_new_pages(rand.gen_range(0..8)),
            _ => manager.advance_all(),
        }
    }
}

#[test]
fn test_parallel_state_changes_and_purges() {
    let manager = get_test_manager();
    let done = AtomicBool::new(false);

    thread::scope(|scope| {
        let workers: Vec<_> = (0..WORKERS)
            .map(|i| {
                let manager = &manager;
                scope.spawn(move || worker(manager, OwnerId(i), 0x5eed + i))
            })
            .collect();

        let purger = scope.spawn(|| {
            let mut purged = 0u64;
            while !done.load(Ordering::SeqCst) {
                if manager.purge_one(4) {
                    purged += 1;
                } else {
                    thread::yield_now();
                }
            }
            purged
        });

        for worker in workers {
            worker.join().unwrap();
        }
        done.store(true, Ordering::SeqCst);
        let purged = purger.join().unwrap();
        assert_eq!(manager.counters().purged_objects, purged);
    });

    manager.check_integrity();

    // the ledger agrees with the objects
    for i in 0..WORKERS {
        let owner = OwnerId(i);
        let account = manager.owner_account(owner).unwrap();
        let ledger = manager.ledger();
        assert_eq!(account.volatile_objects + account.nonvolatile_objects, OBJECTS_PER_WORKER as u32);
        assert_eq!(ledger.balance(owner, LedgerEntry::PurgeableVolatile), account.volatile_pages as i64);
        assert_eq!(
            ledger.balance(owner, LedgerEntry::PurgeableNonvolatile),
            account.nonvolatile_pages as i64
        );
        assert_eq!(ledger.balance(owner, LedgerEntry::PhysFootprint), account.nonvolatile_pages as i64);
    }

    // everything left can be purged
    let summary = manager.purge_all();
    assert_eq!(manager.stats(None).unwrap().total().count, 0);
    assert_eq!(manager.counters().tokens_in_use, 0);
    assert!(summary.objects <= WORKERS * OBJECTS_PER_WORKER as u64);
}

#[test]
fn test_parallel_task_purge() {
    let manager = get_test_manager();

    let handles: Vec<Vec<TestHandle>> = (0..WORKERS)
        .map(|i| {
            (0..OBJECTS_PER_WORKER)
                .map(|j| {
                    let handle = new_object(&manager, j as u64 + 1, OwnerId(i));
                    let order = if j % 2 == 0 { DiscardOrder::Fifo } else { DiscardOrder::Lifo };
                    manager
                        .make_volatile(&handle.try_lock().unwrap(), order, (j % 8) as u8, true)
                        .unwrap();
                    handle
                })
                .collect()
        })
        .collect();

    let expected: u64 = (1..=OBJECTS_PER_WORKER as u64).sum();
    thread::scope(|scope| {
        let purgers: Vec<_> = (0..WORKERS)
            .map(|i| {
                let manager = &manager;
                scope.spawn(move || manager.purge_task_owned(OwnerId(i)))
            })
            .collect();
        for purger in purgers {
            assert_eq!(purger.join().unwrap(), expected);
        }
    });

    for handle in handles.iter().flatten() {
        assert_eq!(handle.object().purge_count(), 1);
    }
    let counters = manager.counters();
    assert_eq!(counters.tokens_in_use, 0);
    assert_eq!(counters.available_for_purge, 0);
    manager.check_integrity();
}
