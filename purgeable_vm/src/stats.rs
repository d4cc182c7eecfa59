use crate::VOLATILE_GROUP_COUNT;

/// Number and size of the objects in one volatility group
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct GroupCounts {
    pub count: u64,

    /// Resident size in bytes
    pub size: u64,
}

impl GroupCounts {
    pub(crate) fn add(&mut self, bytes: u64) {
        self.count += 1;
        self.size += bytes;
    }
}

/// Volatile objects per discard order class and volatility group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct PurgeableStats {
    /// Obsolete objects only use group 0
    pub obsolete: GroupCounts,
    pub fifo: [GroupCounts; VOLATILE_GROUP_COUNT],
    pub lifo: [GroupCounts; VOLATILE_GROUP_COUNT],
}

impl PurgeableStats {
    /// Sum over all classes and groups
    pub fn total(&self) -> GroupCounts {
        self.fifo
            .iter()
            .chain(self.lifo.iter())
            .fold(self.obsolete, |total, group| GroupCounts {
                count: total.count + group.count,
                size: total.size + group.size,
            })
    }

    #[cfg(feature = "stats_json")]
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Counters of the eviction engine and the token arena.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct PurgeCounters {
    pub purged_objects: u64,

    /// Objects purged before their token was ripe
    pub forced_purges: u64,

    /// Resident pages reclaimed by all purges
    pub purged_pages: u64,

    /// Tokens moved between FIFO and LIFO queue
    pub token_migrations: u64,

    /// Ripe tokens over all classes
    pub available_for_purge: u64,

    pub token_capacity: usize,
    pub tokens_in_use: usize,
}

/// Result of [`crate::PurgeableManager::purge_all`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct PurgeSummary {
    pub objects: u64,
    pub pages: u64,
}
