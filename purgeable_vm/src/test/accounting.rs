use std::sync::Arc;

use super::{get_test_manager, new_object};
use crate::{
    modules::{ledger::LedgerEntry, memory_object::SimplePurgeableObject},
    DiscardOrder, ObjectState, OwnerId, PurgeableError,
};

#[test]
fn test_ledger_follows_object_state() {
    let manager = get_test_manager();
    let owner = OwnerId(1);
    let ledger = manager.ledger();

    let handle = manager.register_object(Arc::new(SimplePurgeableObject::new(10, 2)), owner);
    assert_eq!(ledger.balances(owner), [0, 10, 0, 2, 12]);

    manager
        .make_volatile(&handle.try_lock().unwrap(), DiscardOrder::Fifo, 0, false)
        .unwrap();
    assert_eq!(ledger.balances(owner), [10, 0, 2, 0, 0]);

    let account = manager.owner_account(owner).unwrap();
    assert_eq!(account.volatile_objects, 1);
    assert_eq!(account.volatile_pages, 10);
    assert_eq!(account.volatile_compressed_pages, 2);

    // purging frees everything
    assert!(manager.purge_one(1));
    assert_eq!(ledger.balances(owner), [0, 0, 0, 0, 0]);
    assert_eq!(manager.object_state(handle.id()).unwrap(), ObjectState::Empty);

    let guard = handle.try_lock().unwrap();
    assert_eq!(manager.make_nonvolatile(&guard).unwrap(), None);
    assert_eq!(manager.object_state(handle.id()).unwrap(), ObjectState::Nonvolatile);
    assert_eq!(ledger.balances(owner), [0, 0, 0, 0, 0]);

    // the owner refills the object
    let delta = guard.set_resident_pages(6);
    manager.pages_changed(&guard, delta, 0).unwrap();
    assert_eq!(ledger.balances(owner), [0, 6, 0, 0, 6]);

    manager.unregister_object(guard).unwrap();
    assert_eq!(ledger.balances(owner), [0, 0, 0, 0, 0]);
    assert_eq!(manager.owner_account(owner), Err(PurgeableError::NotFound));
}

#[test]
fn test_requeue_keeps_volatile_lines() {
    let manager = get_test_manager();
    let owner = OwnerId(1);
    let handle = new_object(&manager, 4, owner);
    let guard = handle.try_lock().unwrap();

    manager.make_volatile(&guard, DiscardOrder::Fifo, 1, true).unwrap();
    manager.make_volatile(&guard, DiscardOrder::Lifo, 3, true).unwrap();
    assert_eq!(manager.ledger().balances(owner), [4, 0, 0, 0, 0]);

    // the FIFO token was given back
    assert!(manager.inspect_token_queue(DiscardOrder::Fifo).tokens.is_empty());
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Lifo).tokens.len(), 1);

    let account = manager.owner_account(owner).unwrap();
    assert_eq!((account.volatile_objects, account.nonvolatile_objects), (1, 0));

    assert_eq!(manager.make_nonvolatile(&guard).unwrap(), Some(DiscardOrder::Lifo));
    assert_eq!(manager.counters().tokens_in_use, 0);
    assert_eq!(manager.ledger().balances(owner), [0, 4, 0, 0, 4]);
}

#[test]
fn test_change_owner() {
    let manager = get_test_manager();
    let (old_owner, new_owner) = (OwnerId(1), OwnerId(2));
    let handle = new_object(&manager, 8, old_owner);
    let guard = handle.try_lock().unwrap();

    manager.change_owner(&guard, new_owner).unwrap();
    assert_eq!(manager.owner_of(handle.id()).unwrap(), new_owner);
    assert_eq!(manager.ledger().balances(old_owner), [0, 0, 0, 0, 0]);
    assert_eq!(manager.ledger().balances(new_owner), [0, 8, 0, 0, 8]);
    assert_eq!(
        manager.ledger().ownership_changes(),
        vec![(handle.id(), old_owner, new_owner)]
    );

    // the old owner has no objects left
    assert_eq!(manager.owner_account(old_owner), Err(PurgeableError::NotFound));
    assert_eq!(manager.owner_account(new_owner).unwrap().nonvolatile_objects, 1);

    // volatile objects keep their lines
    manager.make_volatile(&guard, DiscardOrder::Lifo, 0, false).unwrap();
    manager.change_owner(&guard, old_owner).unwrap();
    assert_eq!(manager.ledger().balances(old_owner), [8, 0, 0, 0, 0]);
    assert_eq!(manager.ledger().balances(new_owner), [0, 0, 0, 0, 0]);
    assert_eq!(manager.owner_account(old_owner).unwrap().volatile_objects, 1);
}

#[test]
fn test_disown_task() {
    let manager = get_test_manager();
    let owner = OwnerId(5);

    let volatile = new_object(&manager, 4, owner);
    manager
        .make_volatile(&volatile.try_lock().unwrap(), DiscardOrder::Fifo, 2, false)
        .unwrap();
    let nonvolatile = new_object(&manager, 6, owner);

    assert_eq!(manager.disown_task(owner).unwrap(), 2);
    assert_eq!(manager.ledger().balances(owner), [0, 0, 0, 0, 0]);
    assert_eq!(manager.ledger().balances(OwnerId::DISOWNED), [4, 6, 0, 0, 6]);
    assert_eq!(manager.owner_of(volatile.id()).unwrap(), OwnerId::DISOWNED);
    assert_eq!(manager.owner_of(nonvolatile.id()).unwrap(), OwnerId::DISOWNED);

    let account = manager.owner_account(OwnerId::DISOWNED).unwrap();
    assert_eq!((account.volatile_objects, account.nonvolatile_objects), (1, 1));
    assert_eq!(manager.stats(Some(OwnerId::DISOWNED)).unwrap().fifo[2].count, 1);

    assert_eq!(manager.disown_task(owner), Err(PurgeableError::NotFound));
    assert_eq!(manager.stats(Some(owner)), Err(PurgeableError::NotFound));
    assert!(matches!(
        manager.disown_task(OwnerId::DISOWNED),
        Err(PurgeableError::InvalidArgument(_))
    ));
}

#[test]
fn test_stale_and_invalid_arguments() {
    let manager = get_test_manager();
    let handle = new_object(&manager, 1, OwnerId(1));

    assert!(matches!(
        manager.mark_volatile(&handle.try_lock().unwrap(), DiscardOrder::Fifo, 8, false),
        Err(PurgeableError::InvalidArgument(_))
    ));

    manager.unregister_object(handle.try_lock().unwrap()).unwrap();

    // the handle outlives the registration
    let guard = handle.try_lock().unwrap();
    assert_eq!(
        manager.mark_volatile(&guard, DiscardOrder::Fifo, 0, false),
        Err(PurgeableError::NotFound)
    );
    assert_eq!(manager.make_nonvolatile(&guard), Err(PurgeableError::NotFound));
    assert_eq!(manager.object_state(handle.id()), Err(PurgeableError::NotFound));
    assert_eq!(manager.unregister_object(guard), Err(PurgeableError::NotFound));
}

#[test]
fn test_unregister_gives_back_token() {
    let manager = get_test_manager();
    manager.note_new_pages(9);

    let handle = new_object(&manager, 3, OwnerId(1));
    manager
        .make_volatile(&handle.try_lock().unwrap(), DiscardOrder::Lifo, 0, true)
        .unwrap();
    assert_eq!(manager.counters().tokens_in_use, 1);

    manager.unregister_object(handle.try_lock().unwrap()).unwrap();
    assert_eq!(manager.counters().tokens_in_use, 0);
    assert_eq!(manager.inspect_token_queue(DiscardOrder::Lifo).pending_pages, 9);
    assert_eq!(manager.ledger().balance(OwnerId(1), LedgerEntry::PurgeableVolatile), 0);
    assert_eq!(manager.stats(None).unwrap().total().count, 0);
}
