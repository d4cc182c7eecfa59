use core::fmt;

/// Number of volatility groups per discard order class
pub const VOLATILE_GROUP_COUNT: usize = 8;

/// Policy that decides which volatile object of a group is discarded first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub enum DiscardOrder {
    /// Objects are ripe immediately and purged before any other class
    Obsolete,

    /// Oldest object of a group first
    Fifo,

    /// Newest object of a group first
    Lifo,
}

impl DiscardOrder {
    /// All classes in the order in which eviction visits them
    pub const ALL: [DiscardOrder; 3] = [DiscardOrder::Obsolete, DiscardOrder::Fifo, DiscardOrder::Lifo];

    /// Classes whose tokens are aged by the sweep
    pub const AGING: [DiscardOrder; 2] = [DiscardOrder::Fifo, DiscardOrder::Lifo];

    #[inline]
    pub fn is_aging(self) -> bool {
        !matches!(self, DiscardOrder::Obsolete)
    }

    /// The aging class that takes over tokens from this one during migration
    pub(crate) fn migration_partner(self) -> Option<DiscardOrder> {
        match self {
            DiscardOrder::Obsolete => None,
            DiscardOrder::Fifo => Some(DiscardOrder::Lifo),
            DiscardOrder::Lifo => Some(DiscardOrder::Fifo),
        }
    }

    /// Obsolete objects all share group 0
    pub(crate) fn effective_group(self, group: u8) -> u8 {
        match self {
            DiscardOrder::Obsolete => 0,
            DiscardOrder::Fifo | DiscardOrder::Lifo => group,
        }
    }
}

impl fmt::Display for DiscardOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DiscardOrder::Obsolete => write!(f, "obsolete"),
            DiscardOrder::Fifo => write!(f, "fifo"),
            DiscardOrder::Lifo => write!(f, "lifo"),
        }
    }
}
