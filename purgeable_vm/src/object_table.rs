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

use std::sync::Arc;

use crate::{accounting::OwnerId, DiscardOrder};

/// Identifies an object registered at a [`crate::PurgeableManager`].
///
/// Slots are reused after an object is unregistered, the generation tells
/// stale ids apart from the current occupant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId {
    index: u32,
    generation: u32,
}

impl ObjectId {
    #[inline]
    pub(crate) fn index(self) -> u32 {
        self.index
    }
}

/// The list an object is linked into. An object is in exactly one list at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Membership {
    Nonvolatile,
    Volatile { order: DiscardOrder, group: u8 },
}

/// Which ledger entries the pages of an object are charged to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum AccountingState {
    Nonvolatile,
    Volatile,

    /// Purged. Charged like a volatile object, while being on the nonvolatile list.
    Empty,
}

impl AccountingState {
    #[inline]
    pub(crate) fn is_volatile(self) -> bool {
        !matches!(self, AccountingState::Nonvolatile)
    }
}

pub(crate) struct ObjectEntry<O> {
    pub(crate) object: Arc<O>,
    pub(crate) owner: OwnerId,
    pub(crate) membership: Membership,
    pub(crate) state: AccountingState,

    /// Object carries a token of its discard order class
    pub(crate) purge_when_ripe: bool,

    prev: Option<u32>,
    next: Option<u32>,
}

impl<O> ObjectEntry<O> {
    pub(crate) fn new(object: Arc<O>, owner: OwnerId) -> Self {
        Self {
            object,
            owner,
            membership: Membership::Nonvolatile,
            state: AccountingState::Nonvolatile,
            purge_when_ripe: false,
            prev: None,
            next: None,
        }
    }
}

struct Slot<O> {
    generation: u32,
    entry: Option<ObjectEntry<O>>,
}

/// Doubly linked list of objects, linked by slot index through the object table
#[derive(Debug, Default)]
pub(crate) struct ObjectList {
    head: Option<u32>,
    tail: Option<u32>,
    len: usize,
}

impl ObjectList {
    pub(crate) const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub(crate) fn head(&self) -> Option<u32> {
        self.head
    }
}

/// Slot map of all registered objects
pub(crate) struct ObjectTable<O> {
    slots: Vec<Slot<O>>,
    free_slots: Vec<u32>,
    len: usize,
}

impl<O> ObjectTable<O> {
    pub(crate) fn new() -> Self {
        Self {
            slots: Vec::new(),
            free_slots: Vec::new(),
            len: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.len
    }

    /// Stores `entry` in a free slot. The entry is not linked into any list yet.
    pub(crate) fn insert(&mut self, entry: ObjectEntry<O>) -> ObjectId {
        self.len += 1;

        if let Some(index) = self.free_slots.pop() {
            let slot = &mut self.slots[index as usize];
            debug_assert!(slot.entry.is_none());
            slot.entry = Some(entry);
            return ObjectId {
                index,
                generation: slot.generation,
            };
        }

        let index = u32::try_from(self.slots.len()).expect("object table is full");
        self.slots.push(Slot {
            generation: 0,
            entry: Some(entry),
        });
        ObjectId {
            index,
            generation: 0,
        }
    }

    /// Removes the entry of `index`. It has to be unlinked already.
    pub(crate) fn remove(&mut self, index: u32) -> ObjectEntry<O> {
        let slot = &mut self.slots[index as usize];
        let entry = slot.entry.take().expect("object slot is vacant");
        debug_assert!(entry.prev.is_none() && entry.next.is_none(), "removed linked object");

        slot.generation = slot.generation.wrapping_add(1);
        self.free_slots.push(index);
        self.len -= 1;
        entry
    }

    /// Returns the slot index of `id` if it still refers to a registered object
    pub(crate) fn resolve(&self, id: ObjectId) -> Option<u32> {
        let slot = self.slots.get(id.index as usize)?;
        if slot.generation == id.generation && slot.entry.is_some() {
            Some(id.index)
        } else {
            None
        }
    }

    pub(crate) fn id_at(&self, index: u32) -> ObjectId {
        ObjectId {
            index,
            generation: self.slots[index as usize].generation,
        }
    }

    #[inline]
    pub(crate) fn entry(&self, index: u32) -> &ObjectEntry<O> {
        self.slots[index as usize]
            .entry
            .as_ref()
            .expect("object slot is vacant")
    }

    #[inline]
    pub(crate) fn entry_mut(&mut self, index: u32) -> &mut ObjectEntry<O> {
        self.slots[index as usize]
            .entry
            .as_mut()
            .expect("object slot is vacant")
    }

    #[inline]
    pub(crate) fn next_of(&self, index: u32) -> Option<u32> {
        self.entry(index).next
    }

    pub(crate) fn push_back(&mut self, list: &mut ObjectList, index: u32) {
        let prev_tail = list.tail;
        {
            let entry = self.entry_mut(index);
            debug_assert!(entry.prev.is_none() && entry.next.is_none(), "object is linked twice");
            entry.prev = prev_tail;
            entry.next = None;
        }

        match prev_tail {
            Some(tail) => self.entry_mut(tail).next = Some(index),
            None => list.head = Some(index),
        }
        list.tail = Some(index);
        list.len += 1;
    }

    pub(crate) fn push_front(&mut self, list: &mut ObjectList, index: u32) {
        let prev_head = list.head;
        {
            let entry = self.entry_mut(index);
            debug_assert!(entry.prev.is_none() && entry.next.is_none(), "object is linked twice");
            entry.prev = None;
            entry.next = prev_head;
        }

        match prev_head {
            Some(head) => self.entry_mut(head).prev = Some(index),
            None => list.tail = Some(index),
        }
        list.head = Some(index);
        list.len += 1;
    }

    pub(crate) fn unlink(&mut self, list: &mut ObjectList, index: u32) {
        let (prev, next) = {
            let entry = self.entry_mut(index);
            let links = (entry.prev, entry.next);
            entry.prev = None;
            entry.next = None;
            links
        };

        match prev {
            Some(prev) => self.entry_mut(prev).next = next,
            None => {
                debug_assert_eq!(list.head, Some(index), "object is not in this list");
                list.head = next;
            }
        }
        match next {
            Some(next) => self.entry_mut(next).prev = prev,
            None => {
                debug_assert_eq!(list.tail, Some(index), "object is not in this list");
                list.tail = prev;
            }
        }
        list.len -= 1;
    }

    /// Iterates over the slot indices of `list`, front to back
    pub(crate) fn iter<'a>(&'a self, list: &ObjectList) -> ListIter<'a, O> {
        ListIter {
            table: self,
            curr: list.head,
        }
    }

    /// Walks `list` and checks its links. Every visited slot is marked in `seen`.
    pub(crate) fn check_list(&self, list: &ObjectList, membership: Membership, seen: &mut [bool]) {
        let mut prev = None;
        let mut curr = list.head;
        let mut len = 0;

        while let Some(index) = curr {
            let entry = self.entry(index);
            assert_eq!(entry.prev, prev, "object list: broken prev link at slot {}", index);
            assert_eq!(
                entry.membership, membership,
                "object in slot {} is linked into the wrong list",
                index
            );
            assert!(!seen[index as usize], "object in slot {} is linked twice", index);
            seen[index as usize] = true;

            if let Membership::Volatile { .. } = membership {
                assert_eq!(entry.state, AccountingState::Volatile, "queued object in slot {} is not volatile", index);
            }

            len += 1;
            prev = curr;
            curr = entry.next;
        }

        assert_eq!(list.tail, prev, "object list: tail does not match last object");
        assert_eq!(list.len, len, "object list: length mismatch");
    }

    pub(crate) fn slot_count(&self) -> usize {
        self.slots.len()
    }
}

pub(crate) struct ListIter<'a, O> {
    table: &'a ObjectTable<O>,
    curr: Option<u32>,
}

impl<'a, O> Iterator for ListIter<'a, O> {
    type Item = (u32, &'a ObjectEntry<O>);

    fn next(&mut self) -> Option<Self::Item> {
        let index = self.curr?;
        let entry = self.table.entry(index);
        self.curr = entry.next;
        Some((index, entry))
    }
}
