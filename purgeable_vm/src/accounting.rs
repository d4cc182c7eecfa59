/*
 *  Copyright (C) 2025  Markus Elias Gerber
 *
 *  This program is free software: you can redistribute it and/or modify
 *  it under the terms of the GNU General Public License as published by
 *  the Free Software Foundation, either version 3 of the License, or
 *  (at your option) any later version.
 *
 *  This program is distributed in the hope that it will be useful,
 *  but WITHOUT ANY WARRANTY; without even the implied warranty of
 *  MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
 *  GNU General Public License for more details.
 *
 *  You should have received a copy of the GNU General Public License
 *  along with this program.  If not, see <https://www.gnu.org/licenses/>.
 */

//! Owner bookkeeping and the ledger lines an object is charged to.

use std::{
    collections::{BTreeSet, HashMap},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use crate::{
    modules::ledger::{LedgerEntry, LedgerModule},
    object_table::AccountingState,
    ObjectId,
};

/// Task (or other entity) that owns purgeable objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerId(pub u64);

impl OwnerId {
    /// Objects whose owner exited without destroying them
    pub const DISOWNED: OwnerId = OwnerId(u64::MAX);

    #[inline]
    pub fn is_disowned(self) -> bool {
        self == Self::DISOWNED
    }
}

/// Summary of the purgeable objects of one owner.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OwnerAccount {
    /// Objects currently linked into a volatility queue
    pub volatile_objects: u32,

    /// Objects on the nonvolatile list (this includes purged objects)
    pub nonvolatile_objects: u32,

    pub volatile_pages: u64,
    pub volatile_compressed_pages: u64,
    pub nonvolatile_pages: u64,
    pub nonvolatile_compressed_pages: u64,
}

/// Bookkeeping of one owner, protected by its own lock.
#[derive(Debug, Default)]
pub(crate) struct OwnerBook {
    pub(crate) volatile_objects: u32,
    pub(crate) nonvolatile_objects: u32,
    pub(crate) objects: BTreeSet<ObjectId>,
}

impl OwnerBook {
    /// Moves one object between the volatile and the nonvolatile count
    pub(crate) fn object_became_volatile(&mut self, volatile: bool) {
        if volatile {
            debug_assert!(self.nonvolatile_objects > 0);
            self.nonvolatile_objects -= 1;
            self.volatile_objects += 1;
        } else {
            debug_assert!(self.volatile_objects > 0);
            self.volatile_objects -= 1;
            self.nonvolatile_objects += 1;
        }
    }

    pub(crate) fn add_object(&mut self, id: ObjectId, volatile: bool) {
        let inserted = self.objects.insert(id);
        debug_assert!(inserted, "object {:?} is already in this book", id);
        if volatile {
            self.volatile_objects += 1;
        } else {
            self.nonvolatile_objects += 1;
        }
    }

    pub(crate) fn remove_object(&mut self, id: ObjectId, volatile: bool) {
        let removed = self.objects.remove(&id);
        debug_assert!(removed, "object {:?} is not in this book", id);
        if volatile {
            debug_assert!(self.volatile_objects > 0);
            self.volatile_objects -= 1;
        } else {
            debug_assert!(self.nonvolatile_objects > 0);
            self.nonvolatile_objects -= 1;
        }
    }
}

/// All owner books.
///
/// Books are only created and removed while holding the queue lock,
/// so a book that was looked up under that lock stays registered until it is released.
pub(crate) struct OwnerRegistry {
    books: Mutex<HashMap<OwnerId, Arc<Mutex<OwnerBook>>>>,
}

impl OwnerRegistry {
    pub(crate) fn new() -> Self {
        Self {
            books: Mutex::new(HashMap::new()),
        }
    }

    fn books(&self) -> MutexGuard<'_, HashMap<OwnerId, Arc<Mutex<OwnerBook>>>> {
        self.books.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn existing(&self, owner: OwnerId) -> Option<Arc<Mutex<OwnerBook>>> {
        self.books().get(&owner).cloned()
    }

    /// Runs `f` with the locked book of `owner`, creating the book if needed
    pub(crate) fn with_book<R>(&self, owner: OwnerId, f: impl FnOnce(&mut OwnerBook) -> R) -> R {
        let book = Arc::clone(self.books().entry(owner).or_default());
        let mut book = lock_book(&book);
        f(&mut book)
    }

    /// Removes the book of `owner` from the registry
    pub(crate) fn remove(&self, owner: OwnerId) -> Option<Arc<Mutex<OwnerBook>>> {
        self.books().remove(&owner)
    }

    /// Drops the book of `owner` if it has no objects anymore
    pub(crate) fn release_if_empty(&self, owner: OwnerId) {
        let mut books = self.books();
        let empty = books
            .get(&owner)
            .map_or(false, |book| lock_book(book).objects.is_empty());
        if empty {
            books.remove(&owner);
        }
    }
}

pub(crate) fn lock_book(book: &Mutex<OwnerBook>) -> MutexGuard<'_, OwnerBook> {
    book.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Ledger lines of an object in `state` with the given page counts.
///
/// Volatile and purged objects have no footprint.
pub(crate) fn ledger_lines(state: AccountingState, resident: u64, compressed: u64) -> [(LedgerEntry, u64); 3] {
    if state.is_volatile() {
        [
            (LedgerEntry::PurgeableVolatile, resident),
            (LedgerEntry::PurgeableVolatileCompressed, compressed),
            (LedgerEntry::PhysFootprint, 0),
        ]
    } else {
        [
            (LedgerEntry::PurgeableNonvolatile, resident),
            (LedgerEntry::PurgeableNonvolatileCompressed, compressed),
            (LedgerEntry::PhysFootprint, resident + compressed),
        ]
    }
}

pub(crate) fn credit_lines<L: LedgerModule>(
    ledger: &L,
    owner: OwnerId,
    state: AccountingState,
    resident: u64,
    compressed: u64,
) {
    for (entry, pages) in ledger_lines(state, resident, compressed) {
        if pages > 0 {
            ledger.credit(owner, entry, pages);
        }
    }
}

pub(crate) fn debit_lines<L: LedgerModule>(
    ledger: &L,
    owner: OwnerId,
    state: AccountingState,
    resident: u64,
    compressed: u64,
) {
    for (entry, pages) in ledger_lines(state, resident, compressed) {
        if pages > 0 {
            ledger.debit(owner, entry, pages);
        }
    }
}

/// Moves the pages of an object from the lines of `from` to the lines of `to`.
///
/// Nothing happens if both states are charged to the same lines
/// (e.g. volatile to purged).
pub(crate) fn transition_lines<L: LedgerModule>(
    ledger: &L,
    owner: OwnerId,
    from: AccountingState,
    to: AccountingState,
    resident: u64,
    compressed: u64,
) {
    if from.is_volatile() == to.is_volatile() {
        return;
    }
    debit_lines(ledger, owner, from, resident, compressed);
    credit_lines(ledger, owner, to, resident, compressed);
}

/// Applies a signed page count change to the lines of `state`
pub(crate) fn apply_page_delta<L: LedgerModule>(
    ledger: &L,
    owner: OwnerId,
    state: AccountingState,
    resident_delta: i64,
    compressed_delta: i64,
) {
    let (resident_entry, compressed_entry) = if state.is_volatile() {
        (LedgerEntry::PurgeableVolatile, LedgerEntry::PurgeableVolatileCompressed)
    } else {
        (LedgerEntry::PurgeableNonvolatile, LedgerEntry::PurgeableNonvolatileCompressed)
    };

    apply_delta(ledger, owner, resident_entry, resident_delta);
    apply_delta(ledger, owner, compressed_entry, compressed_delta);
    if !state.is_volatile() {
        apply_delta(ledger, owner, LedgerEntry::PhysFootprint, resident_delta + compressed_delta);
    }
}

fn apply_delta<L: LedgerModule>(ledger: &L, owner: OwnerId, entry: LedgerEntry, delta: i64) {
    if delta > 0 {
        ledger.credit(owner, entry, delta as u64);
    } else if delta < 0 {
        ledger.debit(owner, entry, delta.unsigned_abs());
    }
}

#[cfg(test)]
mod test {
    use super::{apply_page_delta, transition_lines, OwnerBook};
    use crate::{
        modules::ledger::{LedgerEntry, TaskLedgerModule},
        object_table::AccountingState,
        OwnerId,
    };

    #[test]
    fn test_transition_moves_lines() {
        let ledger = TaskLedgerModule::new();
        let owner = OwnerId(1);

        super::credit_lines(&ledger, owner, AccountingState::Nonvolatile, 10, 2);
        assert_eq!(ledger.balances(owner), [0, 10, 0, 2, 12]);

        transition_lines(&ledger, owner, AccountingState::Nonvolatile, AccountingState::Volatile, 10, 2);
        assert_eq!(ledger.balances(owner), [10, 0, 2, 0, 0]);

        // purging does not move anything
        transition_lines(&ledger, owner, AccountingState::Volatile, AccountingState::Empty, 10, 2);
        assert_eq!(ledger.balances(owner), [10, 0, 2, 0, 0]);
    }

    #[test]
    fn test_page_delta() {
        let ledger = TaskLedgerModule::new();
        let owner = OwnerId(1);

        apply_page_delta(&ledger, owner, AccountingState::Nonvolatile, 5, 3);
        apply_page_delta(&ledger, owner, AccountingState::Nonvolatile, -2, 0);
        assert_eq!(ledger.balance(owner, LedgerEntry::PurgeableNonvolatile), 3);
        assert_eq!(ledger.balance(owner, LedgerEntry::PhysFootprint), 6);

        apply_page_delta(&ledger, owner, AccountingState::Volatile, 4, -1);
        assert_eq!(ledger.balance(owner, LedgerEntry::PurgeableVolatile), 4);
        assert_eq!(ledger.balance(owner, LedgerEntry::PurgeableVolatileCompressed), -1);
        assert_eq!(ledger.balance(owner, LedgerEntry::PhysFootprint), 6);
    }

    #[test]
    fn test_owner_book_counts() {
        let mut book = OwnerBook::default();
        let ids: Vec<_> = {
            let mut table = crate::object_table::ObjectTable::new();
            (0..2)
                .map(|i| table.insert(crate::object_table::ObjectEntry::new(std::sync::Arc::new(i), OwnerId(1))))
                .collect()
        };

        book.add_object(ids[0], false);
        book.add_object(ids[1], false);
        book.object_became_volatile(true);
        assert_eq!((book.volatile_objects, book.nonvolatile_objects), (1, 1));

        book.remove_object(ids[0], true);
        assert_eq!((book.volatile_objects, book.nonvolatile_objects), (0, 1));
        assert_eq!(book.objects.len(), 1);
    }
}
