pub mod ledger;
pub mod memory_object;
pub mod token_storage;
