mod accounting;
mod discard_order;
mod error;
mod eviction;
mod object_guard;
mod object_table;
mod purgeable_config;
mod purgeable_manager;
mod purgeable_queues;
mod stats;
mod token;
mod util;
mod volatility_queue;

#[cfg(test)]
mod test;

pub mod modules;

pub use crate::accounting::{OwnerAccount, OwnerId};
pub use crate::discard_order::{DiscardOrder, VOLATILE_GROUP_COUNT};
pub use crate::error::PurgeableError;
pub use crate::object_guard::{ObjectGuard, ObjectHandle};
pub use crate::object_table::ObjectId;
pub use crate::purgeable_config::PurgeableConfig;
pub use crate::purgeable_manager::{ObjectState, PurgeableManager};
pub use crate::stats::{GroupCounts, PurgeCounters, PurgeSummary, PurgeableStats};
pub use crate::token::{Token, TokenId, TokenQueueSnapshot};
