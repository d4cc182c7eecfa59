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

use log::{debug, trace};

use crate::{
    object_table::{AccountingState, Membership, ObjectList, ObjectTable},
    token::{take_ripe_token_with_fallback, TokenArena, TokenId, TokenQueue},
    volatility_queue::VolatilityQueues,
    DiscardOrder, PurgeCounters, TokenQueueSnapshot, VOLATILE_GROUP_COUNT,
};

/// The token queues of all classes
pub(crate) struct TokenQueues {
    pub(crate) obsolete: TokenQueue,
    pub(crate) fifo: TokenQueue,
    pub(crate) lifo: TokenQueue,
}

impl TokenQueues {
    fn new() -> Self {
        Self {
            obsolete: TokenQueue::new(DiscardOrder::Obsolete),
            fifo: TokenQueue::new(DiscardOrder::Fifo),
            lifo: TokenQueue::new(DiscardOrder::Lifo),
        }
    }

    #[inline]
    pub(crate) fn get(&self, order: DiscardOrder) -> &TokenQueue {
        match order {
            DiscardOrder::Obsolete => &self.obsolete,
            DiscardOrder::Fifo => &self.fifo,
            DiscardOrder::Lifo => &self.lifo,
        }
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, order: DiscardOrder) -> &mut TokenQueue {
        match order {
            DiscardOrder::Obsolete => &mut self.obsolete,
            DiscardOrder::Fifo => &mut self.fifo,
            DiscardOrder::Lifo => &mut self.lifo,
        }
    }

    /// Mutable references to both aging queues
    fn pair_mut(&mut self, first: DiscardOrder, second: DiscardOrder) -> (&mut TokenQueue, &mut TokenQueue) {
        match (first, second) {
            (DiscardOrder::Fifo, DiscardOrder::Lifo) => (&mut self.fifo, &mut self.lifo),
            (DiscardOrder::Lifo, DiscardOrder::Fifo) => (&mut self.lifo, &mut self.fifo),
            _ => panic!("no token migration between {} and {}", first, second),
        }
    }
}

/// Everything protected by the queue lock: tokens, objects and their lists.
pub(crate) struct PurgeableQueues<O> {
    pub(crate) arena: TokenArena,
    pub(crate) tokens: TokenQueues,

    /// Number of ripe tokens over all classes
    pub(crate) available_for_purge: i64,

    /// Pages observed while there was no token to put them in
    pub(crate) pending_new_tokens_pages: i64,

    pub(crate) objects: ObjectTable<O>,
    pub(crate) volatility: VolatilityQueues,
    pub(crate) nonvolatile: ObjectList,

    pub(crate) counters: PurgeCounters,

    /// Incremented to release all threads that wait for the arena to grow
    pub(crate) abort_epoch: u64,
}

impl<O> PurgeableQueues<O> {
    pub(crate) fn new() -> Self {
        Self {
            arena: TokenArena::new(),
            tokens: TokenQueues::new(),
            available_for_purge: 0,
            pending_new_tokens_pages: 0,
            objects: ObjectTable::new(),
            volatility: VolatilityQueues::new(),
            nonvolatile: ObjectList::new(),
            counters: PurgeCounters::default(),
            abort_epoch: 0,
        }
    }

    // ---------------------------------------------------------------------
    // tokens

    /// Links the freshly allocated token `id` at the tail of the `order` queue.
    pub(crate) fn append_allocated_token(&mut self, order: DiscardOrder, id: TokenId) {
        let count = if order.is_aging() {
            // pages that were observed before any token existed
            let pending = core::mem::take(&mut self.pending_new_tokens_pages);
            for aging in DiscardOrder::AGING {
                let queue = self.tokens.get_mut(aging);
                queue.pending_pages = queue.pending_pages.saturating_add(pending);
            }

            let queue = self.tokens.get_mut(order);
            let count = queue.pending_pages.clamp(0, u32::MAX as i64);
            queue.pending_pages -= count;
            count as u32
        } else {
            // obsolete tokens are ripe right away
            0
        };

        let queue = self.tokens.get_mut(order);
        queue.link_tail(&mut self.arena, id, count, &mut self.available_for_purge);
    }

    /// Deletes the oldest token of `order`, folding its count into the next one.
    pub(crate) fn delete_first_token(&mut self, order: DiscardOrder) -> bool {
        let queue = self.tokens.get_mut(order);
        match queue.remove_first(&mut self.arena, &mut self.available_for_purge) {
            Some(id) => {
                self.arena.release(id);
                true
            }
            None => false,
        }
    }

    /// Deletes the newest token of `order`, its count goes back to the pending pages.
    pub(crate) fn delete_last_token(&mut self, order: DiscardOrder) -> bool {
        let queue = self.tokens.get_mut(order);
        match queue.remove_last(&mut self.arena, &mut self.available_for_purge) {
            Some(id) => {
                self.arena.release(id);
                true
            }
            None => false,
        }
    }

    /// Consumes the ripe first token of `order`.
    ///
    /// **Note**: The first token of `order` has to be ripe.
    pub(crate) fn take_ripe_token(&mut self, order: DiscardOrder) {
        let queue = self.tokens.get_mut(order);
        let id = queue.remove_ripe(&mut self.arena, &mut self.available_for_purge);
        self.arena.release(id);
        trace!("Consumed ripe token {:?} of {} queue", id, order);
    }

    /// Consumes a ripe token for an object of `primary`, falling back to `secondary`.
    /// See [`take_ripe_token_with_fallback`].
    pub(crate) fn take_ripe_token_with_fallback(&mut self, primary: DiscardOrder, secondary: DiscardOrder) {
        let (primary, secondary) = self.tokens.pair_mut(primary, secondary);
        let migrated = take_ripe_token_with_fallback(
            primary,
            Some(secondary),
            &mut self.arena,
            &mut self.available_for_purge,
        );
        if migrated {
            self.counters.token_migrations += 1;
        }
    }

    /// One aging tick for all aging classes
    pub(crate) fn advance_all(&mut self, pending_flush_threshold: i64) {
        if self.pending_new_tokens_pages > pending_flush_threshold {
            let pending = core::mem::take(&mut self.pending_new_tokens_pages);
            debug!("Flushing {} pending pages into the token queues", pending);
            for order in DiscardOrder::AGING {
                let queue = self.tokens.get_mut(order);
                queue.pending_pages = queue.pending_pages.saturating_add(pending);
            }
        }

        for order in DiscardOrder::AGING {
            #[cfg(debug_assertions)]
            let before = self.class_pages(order);

            let queue = self.tokens.get_mut(order);
            queue.advance(&mut self.arena, &mut self.available_for_purge);

            #[cfg(debug_assertions)]
            assert_eq!(
                self.class_pages(order),
                before - 1,
                "{} queue did not age by exactly one page",
                order
            );
        }
    }

    /// Pages represented by the tokens and pending pages of `order`
    pub(crate) fn class_pages(&self, order: DiscardOrder) -> i64 {
        let queue = self.tokens.get(order);
        queue.token_pages(&self.arena) + queue.pending_pages
    }

    pub(crate) fn snapshot(&self, order: DiscardOrder) -> TokenQueueSnapshot {
        self.tokens.get(order).snapshot(&self.arena)
    }

    pub(crate) fn counters(&self) -> PurgeCounters {
        PurgeCounters {
            available_for_purge: self.available_for_purge as u64,
            token_capacity: self.arena.capacity(),
            tokens_in_use: self.arena.in_use(),
            ..self.counters
        }
    }

    // ---------------------------------------------------------------------
    // objects

    /// Removes `index` from the list it is currently linked into
    pub(crate) fn unlink_object(&mut self, index: u32) {
        let membership = self.objects.entry(index).membership;
        let list = match membership {
            Membership::Nonvolatile => &mut self.nonvolatile,
            Membership::Volatile { order, group } => self.volatility.get_mut(order).group_mut(group),
        };
        self.objects.unlink(list, index);
    }

    /// Links the unlinked object `index` into the volatility queue of `order`
    pub(crate) fn link_volatile(&mut self, index: u32, order: DiscardOrder, group: u8) {
        debug_assert!((group as usize) < VOLATILE_GROUP_COUNT);
        self.volatility
            .get_mut(order)
            .enqueue(&mut self.objects, group, index);
        self.objects.entry_mut(index).membership = Membership::Volatile { order, group };
        trace!("Object in slot {} queued in {} group {}", index, order, group);
    }

    /// Links the unlinked object `index` into the nonvolatile list
    pub(crate) fn link_nonvolatile(&mut self, index: u32) {
        self.objects.push_back(&mut self.nonvolatile, index);
        self.objects.entry_mut(index).membership = Membership::Nonvolatile;
        trace!("Object in slot {} moved to the nonvolatile list", index);
    }

    /// Checks all token queues, object lists and counters.
    ///
    /// Panics if something is broken.
    pub(crate) fn check_integrity(&self) {
        // tokens
        let mut ripe = 0;
        let mut linked_tokens = 0;
        for order in DiscardOrder::ALL {
            let queue = self.tokens.get(order);
            ripe += queue.check_integrity(&self.arena);
            linked_tokens += queue.len;
        }
        assert!(self.available_for_purge >= 0, "available_for_purge is negative");
        assert_eq!(
            ripe as i64, self.available_for_purge,
            "available_for_purge does not match the ripe tokens"
        );
        assert_eq!(linked_tokens, self.arena.in_use(), "token arena leaks tokens");
        self.arena.check_integrity();

        // objects
        let mut seen = vec![false; self.objects.slot_count()];
        self.objects
            .check_list(&self.nonvolatile, Membership::Nonvolatile, &mut seen);
        for order in DiscardOrder::ALL {
            let queue = self.volatility.get(order);
            for group in 0..VOLATILE_GROUP_COUNT as u8 {
                let list = queue.group(group);
                if order == DiscardOrder::Obsolete && group > 0 {
                    assert!(list.is_empty(), "obsolete object in group {}", group);
                }
                self.objects
                    .check_list(list, Membership::Volatile { order, group }, &mut seen);
            }
        }

        let linked_objects = seen.iter().filter(|seen| **seen).count();
        assert_eq!(linked_objects, self.objects.len(), "registered object is not linked");

        let queued: usize = DiscardOrder::ALL
            .iter()
            .map(|order| self.volatility.get(*order).object_count())
            .sum();
        assert_eq!(
            queued + self.nonvolatile.len(),
            self.objects.len(),
            "object list lengths do not add up"
        );

        for (index, entry) in self.objects.iter(&self.nonvolatile) {
            assert!(
                !entry.purge_when_ripe,
                "nonvolatile object in slot {} carries a token",
                index
            );
            assert_ne!(entry.state, AccountingState::Volatile, "volatile object in slot {} is not queued", index);
        }
    }
}
