use std::sync::Arc;

use crate::{
    modules::{
        ledger::TaskLedgerModule, memory_object::SimplePurgeableObject,
        token_storage::VecTokenStorageModule,
    },
    DiscardOrder, ObjectHandle, OwnerId, PurgeableConfig, PurgeableManager,
};

mod accounting;
mod concurrency;
mod pending_pages;
mod scenarios;

pub(crate) type TestManager = PurgeableManager<SimplePurgeableObject, TaskLedgerModule, VecTokenStorageModule>;
pub(crate) type TestHandle = ObjectHandle<SimplePurgeableObject>;

pub(crate) fn init_test_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

pub(crate) fn get_test_manager() -> TestManager {
    get_test_manager_with(PurgeableConfig::default(), VecTokenStorageModule::new())
}

pub(crate) fn get_test_manager_with(config: PurgeableConfig, storage: VecTokenStorageModule) -> TestManager {
    init_test_logging();
    PurgeableManager::new(config, TaskLedgerModule::new(), storage).unwrap()
}

/// Registers a new object with `resident` pages
pub(crate) fn new_object(manager: &TestManager, resident: u64, owner: OwnerId) -> TestHandle {
    manager.register_object(Arc::new(SimplePurgeableObject::new(resident, 0)), owner)
}

/// Registers a new object and queues it without a token
pub(crate) fn new_volatile_object(
    manager: &TestManager,
    resident: u64,
    owner: OwnerId,
    order: DiscardOrder,
    group: u8,
) -> TestHandle {
    let handle = new_object(manager, resident, owner);
    manager
        .make_volatile(&handle.try_lock().unwrap(), order, group, false)
        .unwrap();
    handle
}

/// Counts of the token queue of `order`, head first
pub(crate) fn token_counts(manager: &TestManager, order: DiscardOrder) -> Vec<u32> {
    manager
        .inspect_token_queue(order)
        .tokens
        .iter()
        .map(|(_, count)| *count)
        .collect()
}
