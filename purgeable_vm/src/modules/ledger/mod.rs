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

mod dummy;
mod task_ledger;

pub use dummy::DummyLedgerModule;
pub use task_ledger::TaskLedgerModule;

use crate::{ObjectId, OwnerId};

pub(crate) const LEDGER_ENTRY_COUNT: usize = 5;

/// Ledger entries of an owner that purgeable objects are charged to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LedgerEntry {
    PurgeableVolatile,
    PurgeableNonvolatile,
    PurgeableVolatileCompressed,
    PurgeableNonvolatileCompressed,

    /// Memory the owner is actually charged for (nonvolatile pages only)
    PhysFootprint,
}

impl LedgerEntry {
    pub const ALL: [LedgerEntry; LEDGER_ENTRY_COUNT] = [
        LedgerEntry::PurgeableVolatile,
        LedgerEntry::PurgeableNonvolatile,
        LedgerEntry::PurgeableVolatileCompressed,
        LedgerEntry::PurgeableNonvolatileCompressed,
        LedgerEntry::PhysFootprint,
    ];

    pub(crate) fn index(self) -> usize {
        match self {
            LedgerEntry::PurgeableVolatile => 0,
            LedgerEntry::PurgeableNonvolatile => 1,
            LedgerEntry::PurgeableVolatileCompressed => 2,
            LedgerEntry::PurgeableNonvolatileCompressed => 3,
            LedgerEntry::PhysFootprint => 4,
        }
    }
}

/// Per-owner resource accounting.
///
/// Has to be safe for concurrent use: credits and debits for different
/// owners can happen in parallel.
pub trait LedgerModule: Send + Sync {
    fn credit(&self, owner: OwnerId, entry: LedgerEntry, pages: u64);

    fn debit(&self, owner: OwnerId, entry: LedgerEntry, pages: u64);

    /// Importance of `owner` when choosing a victim. Lower values are purged first,
    /// 0 is the least important.
    fn importance(&self, owner: OwnerId) -> i32;

    /// Called after `object` was moved from `old_owner` to `new_owner`.
    /// The ledger lines were already moved at this point.
    fn ownership_changed(&self, _object: ObjectId, _old_owner: OwnerId, _new_owner: OwnerId) {}
}
