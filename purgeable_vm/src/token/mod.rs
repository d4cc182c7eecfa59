//! Aging tokens.
//!
//! A token stands for a cohort of pages that became volatile together. Tokens are stored
//! by value inside a [`TokenArena`] and are linked into [`TokenQueue`]s by index, so the
//! arena can be moved to a bigger allocation without invalidating any links.

use core::num::NonZeroU32;
use static_assertions::assert_eq_size;

use crate::DiscardOrder;

mod arena;
mod queue;


pub(crate) use arena::TokenArena;
pub(crate) use queue::{take_ripe_token_with_fallback, TokenQueue};

/// Index of a token inside the token arena.
///
/// Index 0 is reserved, so `Option<TokenId>` is as small as a plain index
/// and `None` takes the role of the null token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct TokenId(NonZeroU32);

impl TokenId {
    #[inline]
    pub(crate) fn from_index(index: usize) -> Option<TokenId> {
        u32::try_from(index).ok().and_then(NonZeroU32::new).map(TokenId)
    }

    #[inline]
    pub fn index(self) -> usize {
        self.0.get() as usize
    }
}

/// A single aging token as stored in the arena.
#[derive(Debug, Clone, Copy, Default)]
pub struct Token {
    /// Pages that still have to age before this token is ripe
    pub(crate) count: u32,
    pub(crate) prev: Option<TokenId>,

    /// Next token in the queue, or next free token while on the free list
    pub(crate) next: Option<TokenId>,
}

assert_eq_size!(Token, [u32; 3]);
assert_eq_size!(Option<TokenId>, u32);

impl Token {
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    #[inline]
    pub fn is_ripe(&self) -> bool {
        self.count == 0
    }
}

/// Copy of the state of a token queue, in head to tail order.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "stats_json", derive(serde::Serialize))]
pub struct TokenQueueSnapshot {
    pub order: DiscardOrder,

    /// Token ids and their remaining counts
    pub tokens: Vec<(TokenId, u32)>,

    /// Position of the first unripe token inside `tokens`
    pub first_unripe: Option<usize>,

    pub pending_pages: i64,
}

impl TokenQueueSnapshot {
    /// Number of ripe tokens at the front of the queue
    pub fn ripe_tokens(&self) -> usize {
        self.first_unripe.unwrap_or(self.tokens.len())
    }

    /// Pages represented by this queue (not including the global pending counter)
    pub fn total_pages(&self) -> i64 {
        self.tokens.iter().map(|(_, count)| *count as i64).sum::<i64>() + self.pending_pages
    }
}
