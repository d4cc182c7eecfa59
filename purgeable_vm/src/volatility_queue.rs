use crate::{
    object_table::{ObjectList, ObjectTable},
    DiscardOrder, VOLATILE_GROUP_COUNT,
};

/// Volatile objects of one discard order class, one list per volatility group.
pub(crate) struct VolatilityQueue {
    pub(crate) order: DiscardOrder,
    groups: [ObjectList; VOLATILE_GROUP_COUNT],
}

impl VolatilityQueue {
    pub(crate) fn new(order: DiscardOrder) -> Self {
        Self {
            order,
            groups: Default::default(),
        }
    }

    #[inline]
    pub(crate) fn group(&self, group: u8) -> &ObjectList {
        &self.groups[group as usize]
    }

    #[inline]
    pub(crate) fn group_mut(&mut self, group: u8) -> &mut ObjectList {
        &mut self.groups[group as usize]
    }

    /// Links `index` into `group`.
    ///
    /// Obsolete and FIFO objects go to the back (last to die),
    /// LIFO objects to the front (first to die).
    pub(crate) fn enqueue<O>(&mut self, objects: &mut ObjectTable<O>, group: u8, index: u32) {
        let order = self.order;
        let list = self.group_mut(group);
        match order {
            DiscardOrder::Obsolete | DiscardOrder::Fifo => objects.push_back(list, index),
            DiscardOrder::Lifo => objects.push_front(list, index),
        }
    }

    pub(crate) fn object_count(&self) -> usize {
        self.groups.iter().map(ObjectList::len).sum()
    }
}

/// The volatility queues of all classes
pub(crate) struct VolatilityQueues {
    pub(crate) obsolete: VolatilityQueue,
    pub(crate) fifo: VolatilityQueue,
    pub(crate) lifo: VolatilityQueue,
}

impl VolatilityQueues {
    pub(crate) fn new() -> Self {
        Self {
            obsolete: VolatilityQueue::new(DiscardOrder::Obsolete),
            fifo: VolatilityQueue::new(DiscardOrder::Fifo),
            lifo: VolatilityQueue::new(DiscardOrder::Lifo),
        }
    }

    #[inline]
    pub(crate) fn get(&self, order: DiscardOrder) -> &VolatilityQueue {
        match order {
            DiscardOrder::Obsolete => &self.obsolete,
            DiscardOrder::Fifo => &self.fifo,
            DiscardOrder::Lifo => &self.lifo,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, order: DiscardOrder) -> &mut VolatilityQueue {
        match order {
            DiscardOrder::Obsolete => &mut self.obsolete,
            DiscardOrder::Fifo => &mut self.fifo,
            DiscardOrder::Lifo => &mut self.lifo,
        }
    }
}
