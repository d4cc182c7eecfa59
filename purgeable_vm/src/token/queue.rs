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

use log::trace;

use super::{TokenArena, TokenId, TokenQueueSnapshot};
use crate::DiscardOrder;

/// Ordered list of tokens of one discard order class.
///
/// Following is always true:
/// - every token before `first_unripe` has a count of 0 (it is ripe)
/// - `first_unripe` (if any) has a count > 0
/// - if `first_unripe` is `None`, every token in the queue is ripe
pub(crate) struct TokenQueue {
    pub(crate) order: DiscardOrder,
    pub(crate) head: Option<TokenId>,
    pub(crate) tail: Option<TokenId>,
    pub(crate) first_unripe: Option<TokenId>,

    /// Pages observed since the last token was appended.
    ///
    /// Can become negative while the queue has no unripe tokens, but never together
    /// with the global pending page counter.
    pub(crate) pending_pages: i64,

    /// Number of linked tokens
    pub(crate) len: usize,
}

impl TokenQueue {
    pub(crate) fn new(order: DiscardOrder) -> Self {
        Self {
            order,
            head: None,
            tail: None,
            first_unripe: None,
            pending_pages: 0,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Returns `true` if the first token of this queue is ripe
    #[inline]
    pub(crate) fn has_ripe_token(&self) -> bool {
        self.head.is_some() && self.head != self.first_unripe
    }

    /// Links the (freshly allocated) token `id` with `count` at the tail.
    pub(crate) fn link_tail(
        &mut self,
        arena: &mut TokenArena,
        id: TokenId,
        count: u32,
        available_for_purge: &mut i64,
    ) {
        {
            let token = arena.get_mut(id);
            token.count = count;
            token.prev = self.tail;
            token.next = None;
        }

        match self.tail {
            Some(tail) => arena.get_mut(tail).next = Some(id),
            None => self.head = Some(id),
        }
        self.tail = Some(id);
        self.len += 1;

        if self.first_unripe.is_none() {
            // queue only contains ripe tokens (or none at all)
            if count > 0 {
                self.first_unripe = Some(id);
            } else {
                *available_for_purge += 1;
            }
        }

        trace!("Appended token {:?} with count {} to {} queue", id, count, self.order);
    }

    /// Unlinks the first token.
    ///
    /// Its remaining count is added to the next token, or to `pending_pages`
    /// if it was the only token. The token is not released to the arena.
    pub(crate) fn remove_first(
        &mut self,
        arena: &mut TokenArena,
        available_for_purge: &mut i64,
    ) -> Option<TokenId> {
        let id = self.head?;
        let token = *arena.get(id);

        if self.first_unripe == Some(id) {
            // no ripe tokens in front of it, move unripe marker
            self.first_unripe = token.next;
        } else {
            // removing a ripe token
            *available_for_purge -= 1;
            assert!(*available_for_purge >= 0, "available_for_purge underflow");
        }

        self.head = token.next;
        match self.head {
            Some(new_head) => {
                let next = arena.get_mut(new_head);
                let sum = next.count as u64 + token.count as u64;
                next.count = sum.min(u32::MAX as u64) as u32;
                next.prev = None;

                // what does not fit into the token stays in the queue
                self.pending_pages += (sum - next.count as u64) as i64;
            }
            None => {
                // the page count has to go to the next token that will be created
                self.pending_pages += token.count as i64;
                self.tail = None;
            }
        }
        self.len -= 1;

        trace!("Removed first token {:?} (count {}) from {} queue", id, token.count, self.order);
        Some(id)
    }

    /// Unlinks the last token and adds its remaining count to `pending_pages`.
    /// The token is not released to the arena.
    pub(crate) fn remove_last(
        &mut self,
        arena: &mut TokenArena,
        available_for_purge: &mut i64,
    ) -> Option<TokenId> {
        let id = self.tail?;
        let token = *arena.get(id);

        if self.first_unripe.is_none() {
            // all tokens are ripe, so is this one
            *available_for_purge -= 1;
            assert!(*available_for_purge >= 0, "available_for_purge underflow");
        } else if self.first_unripe == Some(id) {
            // removing the only unripe token
            self.first_unripe = None;
        }

        if self.head == Some(id) {
            self.head = None;
            self.tail = None;
        } else {
            let new_tail = token.prev.expect("token queue linkage broken: tail without prev");
            debug_assert_eq!(arena.get(new_tail).next, Some(id));
            arena.get_mut(new_tail).next = None;
            self.tail = Some(new_tail);
        }
        self.pending_pages += token.count as i64;
        self.len -= 1;

        trace!("Removed last token {:?} (count {}) from {} queue", id, token.count, self.order);
        Some(id)
    }

    /// Unlinks the ripe first token.
    ///
    /// **Note**: The head of this queue has to be ripe.
    pub(crate) fn remove_ripe(
        &mut self,
        arena: &mut TokenArena,
        available_for_purge: &mut i64,
    ) -> TokenId {
        let id = self.head.expect("no token to take");
        assert!(self.first_unripe != Some(id), "first token of {} queue is not ripe", self.order);

        let token = *arena.get(id);
        debug_assert_eq!(token.count, 0);

        self.head = token.next;
        match self.head {
            Some(new_head) => arena.get_mut(new_head).prev = None,
            None => self.tail = None,
        }
        self.len -= 1;

        *available_for_purge -= 1;
        assert!(*available_for_purge >= 0, "available_for_purge underflow");

        id
    }

    /// Ages this queue by a single page.
    ///
    /// The page is taken from the first unripe token. Every token that reaches a count
    /// of 0 becomes ripe. If there is no unripe token, the page is taken from `pending_pages`.
    pub(crate) fn advance(&mut self, arena: &mut TokenArena, available_for_purge: &mut i64) {
        let mut num_pages: u32 = 1;

        while let Some(id) = self.first_unripe {
            let token = arena.get_mut(id);
            if token.count > 0 && num_pages > 0 {
                token.count -= 1;
                num_pages -= 1;
            }

            if token.count == 0 {
                // one token ripened, check the next one as well
                self.first_unripe = token.next;
                *available_for_purge += 1;
                trace!("Token {:?} of {} queue is ripe", id, self.order);
                continue;
            }

            if num_pages == 0 {
                break;
            }
        }

        if self.first_unripe.is_none() {
            // pages that are not wrapped into a token yet still age
            self.pending_pages -= num_pages as i64;
        }
    }

    /// Inserts `id` with `count` pages according to its age.
    ///
    /// Walks from the head, consuming the counts of the tokens it passes. The token
    /// behind the insertion point (or `pending_pages` if there is none) gives up
    /// the remaining count, so the pages of the queue stay the same.
    pub(crate) fn insert_by_age(&mut self, arena: &mut TokenArena, id: TokenId, mut count: u32) {
        let mut insert_before = self.head;
        while let Some(before) = insert_before {
            let before_token = arena.get(before);
            if count <= before_token.count {
                break;
            }
            count -= before_token.count;
            insert_before = before_token.next;
        }

        if insert_before == self.first_unripe || self.first_unripe.is_none() {
            self.first_unripe = Some(id);
        }

        let insert_after = match insert_before {
            Some(before) => {
                let before_token = arena.get_mut(before);
                let prev = before_token.prev;
                before_token.prev = Some(id);
                debug_assert!(before_token.count >= count);
                before_token.count -= count;
                prev
            }
            None => {
                // ran off the end of the list
                let prev = self.tail;
                self.tail = Some(id);
                debug_assert!(
                    self.pending_pages >= count as i64,
                    "{} queue has less pending pages ({}) than migrated ({})",
                    self.order,
                    self.pending_pages,
                    count
                );
                self.pending_pages -= count as i64;
                prev
            }
        };

        match insert_after {
            Some(after) => arena.get_mut(after).next = Some(id),
            None => self.head = Some(id),
        }

        let token = arena.get_mut(id);
        token.count = count;
        token.prev = insert_after;
        token.next = insert_before;
        self.len += 1;
    }

    /// Sum of all token counts
    pub(crate) fn token_pages(&self, arena: &TokenArena) -> i64 {
        let mut sum = 0;
        let mut curr = self.head;
        while let Some(id) = curr {
            let token = arena.get(id);
            sum += token.count as i64;
            curr = token.next;
        }
        sum
    }

    pub(crate) fn snapshot(&self, arena: &TokenArena) -> TokenQueueSnapshot {
        let mut tokens = Vec::with_capacity(self.len);
        let mut first_unripe = None;
        let mut curr = self.head;
        while let Some(id) = curr {
            if Some(id) == self.first_unripe {
                first_unripe = Some(tokens.len());
            }
            let token = arena.get(id);
            tokens.push((id, token.count));
            curr = token.next;
        }

        TokenQueueSnapshot {
            order: self.order,
            tokens,
            first_unripe,
            pending_pages: self.pending_pages,
        }
    }

    /// Checks linkage and ripeness of this queue.
    ///
    /// Returns the number of ripe tokens in front of `first_unripe`.
    pub(crate) fn check_integrity(&self, arena: &TokenArena) -> usize {
        let mut prev = None;
        let mut curr = self.head;
        let mut len = 0;
        let mut ripe = 0;
        let mut seen_unripe = false;

        while let Some(id) = curr {
            let token = arena.get(id);
            assert_eq!(token.prev, prev, "{} queue: broken prev link at {:?}", self.order, id);

            if Some(id) == self.first_unripe {
                assert!(token.count > 0, "{} queue: first unripe token {:?} is ripe", self.order, id);
                seen_unripe = true;
            }

            if !seen_unripe {
                assert_eq!(token.count, 0, "{} queue: unripe token {:?} in front of marker", self.order, id);
                ripe += 1;
            }

            if !self.order.is_aging() {
                assert_eq!(token.count, 0, "obsolete queue: token {:?} has a count", id);
            }

            len += 1;
            prev = curr;
            curr = token.next;
        }

        assert_eq!(self.tail, prev, "{} queue: tail does not match last token", self.order);
        assert_eq!(self.len, len, "{} queue: length mismatch", self.order);
        if self.first_unripe.is_some() {
            assert!(seen_unripe, "{} queue: first unripe token is not linked", self.order);
        }

        ripe
    }
}

/// Consumes a ripe token for an object that was found in `primary`.
///
/// If `primary` has a ripe first token, that one is released. Otherwise `secondary` has
/// to have one: it is released instead and the first (unripe) token of `primary` is
/// moved over to `secondary`, so that both queues keep their page counts and their
/// age ordering.
///
/// Returns `true` if a token was migrated.
pub(crate) fn take_ripe_token_with_fallback(
    primary: &mut TokenQueue,
    secondary: Option<&mut TokenQueue>,
    arena: &mut TokenArena,
    available_for_purge: &mut i64,
) -> bool {
    if primary.has_ripe_token() {
        let id = primary.remove_ripe(arena, available_for_purge);
        arena.release(id);
        trace!("Consumed ripe token {:?} of {} queue", id, primary.order);
        return false;
    }

    let secondary = secondary.expect("neither queue has a ripe token");
    let ripe = secondary.remove_ripe(arena, available_for_purge);
    arena.release(ripe);

    if primary.is_empty() {
        // nothing left to balance
        return false;
    }

    // primary has no ripe tokens, so its first token is the unripe one
    debug_assert_eq!(primary.head, primary.first_unripe);
    let id = primary
        .remove_first(arena, available_for_purge)
        .expect("queue is not empty");
    let count = arena.get(id).count;
    secondary.insert_by_age(arena, id, count);

    trace!(
        "Consumed ripe token {:?} of {} queue, migrated {:?} (count {}) from {} queue",
        ripe,
        secondary.order,
        id,
        count,
        primary.order
    );
    true
}
