use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
};

use log::trace;

use super::{LedgerEntry, LedgerModule, LEDGER_ENTRY_COUNT};
use crate::{ObjectId, OwnerId};

/// Importance of owners that were never configured
const DEFAULT_IMPORTANCE: i32 = 1;

#[derive(Debug, Default)]
struct TaskLedger {
    balances: [i64; LEDGER_ENTRY_COUNT],
    importance: Option<i32>,
}

/// Keeps a balance per owner and ledger entry.
pub struct TaskLedgerModule {
    tasks: Mutex<HashMap<OwnerId, TaskLedger>>,
    ownership_changes: Mutex<Vec<(ObjectId, OwnerId, OwnerId)>>,
}

impl TaskLedgerModule {
    pub fn new() -> Self {
        Self {
            tasks: Mutex::new(HashMap::new()),
            ownership_changes: Mutex::new(Vec::new()),
        }
    }

    fn tasks(&self) -> MutexGuard<'_, HashMap<OwnerId, TaskLedger>> {
        self.tasks.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Sets the importance `importance()` reports for `owner`
    pub fn set_importance(&self, owner: OwnerId, importance: i32) {
        self.tasks().entry(owner).or_default().importance = Some(importance);
    }

    /// Current balance of `entry` for `owner` in pages
    pub fn balance(&self, owner: OwnerId, entry: LedgerEntry) -> i64 {
        self.tasks()
            .get(&owner)
            .map_or(0, |task| task.balances[entry.index()])
    }

    /// All balances of `owner`, in the order of [`LedgerEntry::ALL`]
    pub fn balances(&self, owner: OwnerId) -> [i64; LEDGER_ENTRY_COUNT] {
        self.tasks()
            .get(&owner)
            .map_or([0; LEDGER_ENTRY_COUNT], |task| task.balances)
    }

    /// All ownership changes reported so far, oldest first
    pub fn ownership_changes(&self) -> Vec<(ObjectId, OwnerId, OwnerId)> {
        self.ownership_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl Default for TaskLedgerModule {
    fn default() -> Self {
        Self::new()
    }
}

impl LedgerModule for TaskLedgerModule {
    fn credit(&self, owner: OwnerId, entry: LedgerEntry, pages: u64) {
        trace!("Credit {} pages to {:?} of {:?}", pages, entry, owner);
        self.tasks().entry(owner).or_default().balances[entry.index()] += pages as i64;
    }

    fn debit(&self, owner: OwnerId, entry: LedgerEntry, pages: u64) {
        trace!("Debit {} pages from {:?} of {:?}", pages, entry, owner);
        self.tasks().entry(owner).or_default().balances[entry.index()] -= pages as i64;
    }

    fn importance(&self, owner: OwnerId) -> i32 {
        self.tasks()
            .get(&owner)
            .and_then(|task| task.importance)
            .unwrap_or(DEFAULT_IMPORTANCE)
    }

    fn ownership_changed(&self, object: ObjectId, old_owner: OwnerId, new_owner: OwnerId) {
        self.ownership_changes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((object, old_owner, new_owner));
    }
}

#[cfg(test)]
mod test {
    use super::TaskLedgerModule;
    use crate::{
        modules::ledger::{LedgerEntry, LedgerModule},
        OwnerId,
    };

    #[test]
    fn test_balances() {
        let ledger = TaskLedgerModule::new();
        let owner = OwnerId(3);

        ledger.credit(owner, LedgerEntry::PurgeableVolatile, 10);
        ledger.debit(owner, LedgerEntry::PurgeableVolatile, 4);
        ledger.credit(OwnerId(4), LedgerEntry::PhysFootprint, 7);

        assert_eq!(ledger.balance(owner, LedgerEntry::PurgeableVolatile), 6);
        assert_eq!(ledger.balance(owner, LedgerEntry::PhysFootprint), 0);
        assert_eq!(ledger.balances(OwnerId(4)), [0, 0, 0, 0, 7]);
        assert_eq!(ledger.balance(OwnerId(99), LedgerEntry::PhysFootprint), 0);
    }

    #[test]
    fn test_importance() {
        let ledger = TaskLedgerModule::new();
        assert_eq!(ledger.importance(OwnerId(1)), 1);

        ledger.set_importance(OwnerId(1), 20);
        ledger.set_importance(OwnerId(2), 0);
        assert_eq!(ledger.importance(OwnerId(1)), 20);
        assert_eq!(ledger.importance(OwnerId(2)), 0);
    }
}
