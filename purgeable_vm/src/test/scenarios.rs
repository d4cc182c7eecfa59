use super::{get_test_manager, new_object, new_volatile_object, token_counts};
use crate::{DiscardOrder, ObjectState, OwnerId};

#[test]
fn test_fifo_token_ripens_at_fifth_tick() {
    let manager = get_test_manager();

    for pages in [5, 3, 7] {
        manager.note_new_pages(pages);
        manager.append_token(DiscardOrder::Fifo).unwrap();
    }
    assert_eq!(token_counts(&manager, DiscardOrder::Fifo), vec![5, 3, 7]);

    for tick in 1..=5 {
        manager.advance_all();
        if tick < 5 {
            assert_eq!(manager.available_for_purge(), 0, "ripened at tick {}", tick);
        }
    }

    let snapshot = manager.inspect_token_queue(DiscardOrder::Fifo);
    assert_eq!(manager.available_for_purge(), 1);
    assert_eq!(snapshot.first_unripe, Some(1));
    assert_eq!(token_counts(&manager, DiscardOrder::Fifo), vec![0, 3, 7]);
}

#[test]
fn test_no_forced_purge_above_group() {
    let manager = get_test_manager();
    let object = new_object(&manager, 8, OwnerId(1));

    // unripe token
    manager.note_new_pages(10);
    manager
        .make_volatile(&object.try_lock().unwrap(), DiscardOrder::Lifo, 2, true)
        .unwrap();
    assert_eq!(token_counts(&manager, DiscardOrder::Lifo), vec![10]);

    assert!(!manager.purge_one(0));
    assert!(!manager.purge_one(2));
    assert_eq!(
        manager.object_state(object.id()).unwrap(),
        ObjectState::Volatile {
            order: DiscardOrder::Lifo,
            group: 2
        }
    );

    assert!(manager.purge_one(3));
    assert_eq!(manager.object_state(object.id()).unwrap(), ObjectState::Empty);
    assert_eq!(object.object().forced_purge_count(), 1);
    assert_eq!(manager.counters().forced_purges, 1);

    // the consumed token handed its pages back
    let lifo = manager.inspect_token_queue(DiscardOrder::Lifo);
    assert!(lifo.tokens.is_empty());
    assert_eq!(lifo.pending_pages, 10);
}

#[test]
fn test_lifo_purges_newest_first() {
    let manager = get_test_manager();
    let a = new_volatile_object(&manager, 1, OwnerId(1), DiscardOrder::Lifo, 0);
    let b = new_volatile_object(&manager, 1, OwnerId(1), DiscardOrder::Lifo, 0);

    assert!(manager.purge_one(1));
    assert_eq!(b.object().purge_count(), 1);
    assert_eq!(a.object().purge_count(), 0);

    assert!(manager.purge_one(1));
    assert_eq!(a.object().purge_count(), 1);
    assert!(!manager.purge_one(1));
}

#[test]
fn test_fifo_purges_oldest_first() {
    let manager = get_test_manager();
    let a = new_volatile_object(&manager, 1, OwnerId(1), DiscardOrder::Fifo, 0);
    let b = new_volatile_object(&manager, 1, OwnerId(1), DiscardOrder::Fifo, 0);

    assert!(manager.purge_one(1));
    assert_eq!(a.object().purge_count(), 1);
    assert_eq!(b.object().purge_count(), 0);

    assert!(manager.purge_one(1));
    assert_eq!(b.object().purge_count(), 1);
}

#[test]
fn test_purge_task_owned() {
    let manager = get_test_manager();
    let task = OwnerId(7);
    let other = OwnerId(8);

    let owned = [
        new_volatile_object(&manager, 10, task, DiscardOrder::Fifo, 0),
        new_volatile_object(&manager, 20, task, DiscardOrder::Fifo, 3),
        new_volatile_object(&manager, 30, task, DiscardOrder::Lifo, 1),
        new_volatile_object(&manager, 40, task, DiscardOrder::Lifo, 1),
    ];
    let nonvolatile = new_object(&manager, 50, task);
    let foreign = [
        new_volatile_object(&manager, 60, other, DiscardOrder::Fifo, 0),
        new_volatile_object(&manager, 70, other, DiscardOrder::Lifo, 1),
    ];

    assert_eq!(manager.purge_task_owned(task), 100);

    for handle in owned.iter() {
        assert_eq!(handle.object().purge_count(), 1);
        assert_eq!(manager.object_state(handle.id()).unwrap(), ObjectState::Empty);
    }
    assert_eq!(nonvolatile.object().purge_count(), 0);
    for handle in foreign.iter() {
        assert_eq!(handle.object().purge_count(), 0);
        assert!(matches!(
            manager.object_state(handle.id()).unwrap(),
            ObjectState::Volatile { .. }
        ));
    }

    // purged objects are back on the nonvolatile list
    let account = manager.owner_account(task).unwrap();
    assert_eq!(account.volatile_objects, 0);
    assert_eq!(account.nonvolatile_objects, 5);

    assert_eq!(manager.stats(Some(task)).unwrap().total().count, 0);
    assert_eq!(manager.stats(None).unwrap().total().count, 2);
    assert_eq!(manager.counters().purged_objects, 4);
}

#[test]
fn test_membership_is_exclusive() {
    let manager = get_test_manager();
    let object = new_object(&manager, 3, OwnerId(1));
    let guard = object.try_lock().unwrap();

    assert_eq!(manager.mark_nonvolatile(&guard).unwrap(), None);

    manager.mark_volatile(&guard, DiscardOrder::Fifo, 4, false).unwrap();
    manager.mark_volatile(&guard, DiscardOrder::Lifo, 6, false).unwrap();
    manager.mark_volatile(&guard, DiscardOrder::Obsolete, 6, false).unwrap();
    assert_eq!(
        manager.object_state(object.id()).unwrap(),
        ObjectState::Volatile {
            order: DiscardOrder::Obsolete,
            group: 0
        }
    );

    let stats = manager.stats(None).unwrap();
    assert_eq!(stats.total().count, 1);
    assert_eq!(stats.obsolete.count, 1);
    assert_eq!(stats.obsolete.size, 3 * 4096);

    assert_eq!(
        manager.mark_nonvolatile(&guard).unwrap(),
        Some(DiscardOrder::Obsolete)
    );
    assert_eq!(manager.stats(None).unwrap().total().count, 0);

    let account = manager.owner_account(OwnerId(1)).unwrap();
    assert_eq!((account.volatile_objects, account.nonvolatile_objects), (0, 1));
    manager.check_integrity();
}
