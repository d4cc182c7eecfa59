use super::{LedgerEntry, LedgerModule};
use crate::OwnerId;

/// Ignores all ledger updates. Every owner has an importance of 0.
pub struct DummyLedgerModule;

impl LedgerModule for DummyLedgerModule {
    fn credit(&self, _owner: OwnerId, _entry: LedgerEntry, _pages: u64) {}

    fn debit(&self, _owner: OwnerId, _entry: LedgerEntry, _pages: u64) {}

    fn importance(&self, _owner: OwnerId) -> i32 {
        0
    }
}
