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

use super::{Token, TokenId};

/// Growable array of tokens with a free list.
///
/// The arena never shrinks. Slot 0 is reserved and never handed out.
/// Growing is done by the caller (see `PurgeableManager::allocate_token`), because
/// the memory for it has to be allocated while the queue lock is released.
pub(crate) struct TokenArena {
    /// All slots up to the high water mark
    tokens: Vec<Token>,

    /// Number of slots that may be used (including the reserved slot).
    /// `tokens` never grows past this limit while the queue lock is held.
    limit: usize,

    /// Singly linked list of released tokens, chained through `Token::next`
    free_head: Option<TokenId>,

    /// How many tokens are currently handed out
    in_use: usize,

    /// Set while one thread grows the arena.
    /// Other threads have to wait until it is cleared again.
    pub(crate) growing: bool,
}

impl TokenArena {
    pub(crate) fn new() -> Self {
        Self {
            tokens: Vec::new(),
            limit: 0,
            free_head: None,
            in_use: 0,
            growing: false,
        }
    }

    /// Hands out a token from the free list or from unused capacity.
    ///
    /// Returns `None` if the arena is exhausted and has to grow first.
    pub(crate) fn try_allocate(&mut self) -> Option<TokenId> {
        let id = if let Some(id) = self.free_head {
            self.free_head = self.tokens[id.index()].next;
            id
        } else if self.tokens.len() < self.limit {
            let id = TokenId::from_index(self.tokens.len())?;
            self.tokens.push(Token::default());
            id
        } else {
            return None;
        };

        self.tokens[id.index()] = Token::default();
        self.in_use += 1;
        Some(id)
    }

    /// Puts `id` back to the front of the free list
    pub(crate) fn release(&mut self, id: TokenId) {
        debug_assert!(self.in_use > 0, "released more tokens than allocated");

        let token = &mut self.tokens[id.index()];
        token.count = 0;
        token.prev = None;
        token.next = self.free_head;

        self.free_head = Some(id);
        self.in_use -= 1;
    }

    #[inline]
    pub(crate) fn get(&self, id: TokenId) -> &Token {
        &self.tokens[id.index()]
    }

    #[inline]
    pub(crate) fn get_mut(&mut self, id: TokenId) -> &mut Token {
        &mut self.tokens[id.index()]
    }

    /// Number of usable slots including the reserved one
    #[inline]
    pub(crate) fn capacity(&self) -> usize {
        self.limit
    }

    #[inline]
    pub(crate) fn in_use(&self) -> usize {
        self.in_use
    }

    /// Length of the free list
    pub(crate) fn free_count(&self) -> usize {
        let mut count = 0;
        let mut curr = self.free_head;
        while let Some(id) = curr {
            count += 1;
            curr = self.tokens[id.index()].next;
        }
        count
    }

    /// Every slot past the reserved one is either handed out or on the free list
    pub(crate) fn check_integrity(&self) {
        let reserved = usize::from(!self.tokens.is_empty());
        assert_eq!(
            self.in_use + self.free_count() + reserved,
            self.tokens.len(),
            "token arena lost slots"
        );
        assert!(self.tokens.len() <= self.limit, "token arena grew past its limit");
    }

    /// Moves all tokens into `storage` and raises the limit to `new_limit`.
    ///
    /// `storage` has to be an empty allocation with room for `new_limit` tokens,
    /// so that no allocation happens while the queue lock is held.
    pub(crate) fn adopt(&mut self, mut storage: Vec<Token>, new_limit: usize) {
        assert!(new_limit > self.limit, "token arena never shrinks");
        debug_assert!(
            storage.capacity() >= new_limit,
            "storage too small (capacity={}, new_limit={})",
            storage.capacity(),
            new_limit
        );

        storage.clear();
        if self.tokens.is_empty() {
            // reserved null slot
            storage.push(Token::default());
        } else {
            storage.extend_from_slice(&self.tokens);
        }

        trace!(
            "Token arena grew from {} to {} slots ({} in use)",
            self.limit,
            new_limit,
            self.in_use
        );

        self.tokens = storage;
        self.limit = new_limit;
    }
}
