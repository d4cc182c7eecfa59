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

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use log::{debug, info, trace, warn};
use static_assertions::assert_impl_all;

use crate::{
    accounting::{self, lock_book, OwnerRegistry},
    modules::{
        ledger::{DummyLedgerModule, LedgerModule},
        memory_object::{PurgeableObject, SimplePurgeableObject},
        token_storage::{TokenStorageModule, VecTokenStorageModule},
    },
    object_table::{AccountingState, Membership, ObjectEntry},
    purgeable_queues::PurgeableQueues,
    DiscardOrder, GroupCounts, ObjectGuard, ObjectHandle, ObjectId, OwnerAccount, OwnerId,
    PurgeCounters, PurgeableConfig, PurgeableError, PurgeableStats, TokenId, TokenQueueSnapshot,
    VOLATILE_GROUP_COUNT,
};

/// Purgeability of a registered object, as seen by the manager
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectState {
    Nonvolatile,
    Volatile { order: DiscardOrder, group: u8 },

    /// The object was purged and not made nonvolatile again
    Empty,
}

/// Tracks, ages and purges volatile objects.
///
/// Locks are always taken in the order: object lock, queue lock, owner lock.
/// While holding the queue lock or an owner lock, object locks are only try-locked.
pub struct PurgeableManager<O: PurgeableObject, L: LedgerModule, T: TokenStorageModule> {
    /// Tokens, object lists and counters
    pub(crate) queues: Mutex<PurgeableQueues<O>>,

    /// Signaled when growing the token arena finished
    arena_grown: Condvar,

    pub(crate) owners: OwnerRegistry,
    pub(crate) ledger: L,
    token_storage: T,
    pub(crate) config: PurgeableConfig,
}

assert_impl_all!(PurgeableManager<SimplePurgeableObject, DummyLedgerModule, VecTokenStorageModule>: Send, Sync);

impl<O: PurgeableObject, L: LedgerModule, T: TokenStorageModule> PurgeableManager<O, L, T> {
    pub fn new(config: PurgeableConfig, ledger: L, token_storage: T) -> Result<Self, PurgeableError> {
        config.validate()?;

        info!(
            "Creating purgeable manager (scan_limit={}, tokens_per_growth={}, max_tokens={})",
            config.scan_limit,
            config.tokens_per_growth(),
            config.max_tokens
        );

        Ok(Self {
            queues: Mutex::new(PurgeableQueues::new()),
            arena_grown: Condvar::new(),
            owners: OwnerRegistry::new(),
            ledger,
            token_storage,
            config,
        })
    }

    #[inline]
    pub fn config(&self) -> &PurgeableConfig {
        &self.config
    }

    #[inline]
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    #[inline]
    pub fn token_storage(&self) -> &T {
        &self.token_storage
    }

    /// All state is checked again before it is used, so a poisoned lock is fine to reuse
    pub(crate) fn lock_queues(&self) -> MutexGuard<'_, PurgeableQueues<O>> {
        self.queues.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[inline]
    pub(crate) fn debug_check(&self, queues: &PurgeableQueues<O>) {
        #[cfg(debug_assertions)]
        queues.check_integrity();

        #[cfg(not(debug_assertions))]
        let _ = queues;
    }

    /// Checks the consistency of all queues and counters. Panics if something is broken.
    pub fn check_integrity(&self) {
        self.lock_queues().check_integrity();
    }

    fn resolve(queues: &PurgeableQueues<O>, id: ObjectId) -> Result<u32, PurgeableError> {
        queues.objects.resolve(id).ok_or(PurgeableError::NotFound)
    }

    // ---------------------------------------------------------------------
    // tokens

    /// Allocates a token, growing the arena if needed.
    ///
    /// Growing releases the queue lock while the token storage module allocates,
    /// so the returned guard may see a different state than the one passed in.
    fn allocate_token<'a>(
        &'a self,
        mut queues: MutexGuard<'a, PurgeableQueues<O>>,
    ) -> Result<(MutexGuard<'a, PurgeableQueues<O>>, TokenId), PurgeableError> {
        loop {
            if let Some(id) = queues.arena.try_allocate() {
                return Ok((queues, id));
            }

            if queues.arena.growing {
                // somebody else is already growing the arena, retry once it is done
                let epoch = queues.abort_epoch;
                queues = self
                    .arena_grown
                    .wait_while(queues, |queues| queues.arena.growing && queues.abort_epoch == epoch)
                    .unwrap_or_else(PoisonError::into_inner);

                if queues.abort_epoch != epoch {
                    debug!("Waiting for token arena growth was aborted");
                    return Err(PurgeableError::Aborted);
                }
                continue;
            }

            let capacity = queues.arena.capacity();
            let new_capacity = capacity
                .saturating_add(self.config.tokens_per_growth())
                .min(self.config.max_tokens);
            if new_capacity <= capacity {
                warn!("Token arena reached its maximum of {} tokens", capacity);
                return Err(PurgeableError::ResourceShortage);
            }

            queues.arena.growing = true;
            drop(queues);

            let storage = self.token_storage.allocate(new_capacity);

            queues = self.lock_queues();
            queues.arena.growing = false;
            self.arena_grown.notify_all();

            match storage {
                Ok(storage) => {
                    debug!("Growing token arena from {} to {} tokens", capacity, new_capacity);
                    queues.arena.adopt(storage, new_capacity);
                }
                Err(()) => {
                    warn!("Token storage could not provide {} tokens", new_capacity);
                    return Err(PurgeableError::ResourceShortage);
                }
            }
        }
    }

    /// Releases all threads waiting for the token arena to grow with [`PurgeableError::Aborted`].
    pub fn abort_token_waiters(&self) {
        let mut queues = self.lock_queues();
        queues.abort_epoch = queues.abort_epoch.wrapping_add(1);
        self.arena_grown.notify_all();
    }

    /// Adds `pages` that entered the aging window to the global pending counter.
    /// They are handed to the next token appended to an aging queue.
    pub fn note_new_pages(&self, pages: u64) {
        let mut queues = self.lock_queues();
        queues.pending_new_tokens_pages = queues
            .pending_new_tokens_pages
            .saturating_add(i64::try_from(pages).unwrap_or(i64::MAX));
    }

    /// Appends a token to the queue of `order`
    pub fn append_token(&self, order: DiscardOrder) -> Result<(), PurgeableError> {
        let queues = self.lock_queues();
        let (mut queues, id) = self.allocate_token(queues)?;
        queues.append_allocated_token(order, id);
        self.debug_check(&queues);
        Ok(())
    }

    /// Deletes the oldest token of `order`. Returns `false` if the queue is empty.
    pub fn remove_first_token(&self, order: DiscardOrder) -> bool {
        let mut queues = self.lock_queues();
        let removed = queues.delete_first_token(order);
        self.debug_check(&queues);
        removed
    }

    /// Deletes the newest token of `order`. Returns `false` if the queue is empty.
    pub fn remove_last_token(&self, order: DiscardOrder) -> bool {
        let mut queues = self.lock_queues();
        let removed = queues.delete_last_token(order);
        self.debug_check(&queues);
        removed
    }

    /// Ages all FIFO and LIFO tokens by one page
    pub fn advance_all(&self) {
        let mut queues = self.lock_queues();
        queues.advance_all(self.config.pending_flush_threshold);
        self.debug_check(&queues);
    }

    /// Number of ripe tokens over all classes
    pub fn available_for_purge(&self) -> u64 {
        self.lock_queues().available_for_purge as u64
    }

    /// Pages noted since the last token was appended to an aging queue
    pub fn pending_new_tokens_pages(&self) -> i64 {
        self.lock_queues().pending_new_tokens_pages
    }

    pub fn inspect_token_queue(&self, order: DiscardOrder) -> TokenQueueSnapshot {
        self.lock_queues().snapshot(order)
    }

    // ---------------------------------------------------------------------
    // objects

    /// Starts tracking `object` as nonvolatile object of `owner`.
    pub fn register_object(&self, object: Arc<O>, owner: OwnerId) -> ObjectHandle<O> {
        let resident = object.resident_pages();
        let compressed = object.compressed_pages();

        let mut queues = self.lock_queues();
        let id = queues
            .objects
            .insert(ObjectEntry::new(Arc::clone(&object), owner));
        queues.link_nonvolatile(id.index());

        self.owners.with_book(owner, |book| {
            book.add_object(id, false);
            accounting::credit_lines(&self.ledger, owner, AccountingState::Nonvolatile, resident, compressed);
        });

        trace!("Registered object {:?} of {:?}", id, owner);
        self.debug_check(&queues);
        ObjectHandle::new(id, object)
    }

    /// Stops tracking the object of `guard`, e.g. because it is destroyed.
    pub fn unregister_object(&self, guard: ObjectGuard<O>) -> Result<(), PurgeableError> {
        let mut queues = self.lock_queues();
        let index = Self::resolve(&queues, guard.id())?;

        let (membership, carried_token) = {
            let entry = queues.objects.entry(index);
            (entry.membership, entry.purge_when_ripe)
        };

        if let Membership::Volatile { order, .. } = membership {
            if carried_token {
                queues.delete_first_token(order);
            }
        }

        queues.unlink_object(index);
        let entry = queues.objects.remove(index);
        let owner = entry.owner;

        let resident = guard.resident_pages();
        let compressed = guard.compressed_pages();
        self.owners.with_book(owner, |book| {
            book.remove_object(guard.id(), matches!(membership, Membership::Volatile { .. }));
            accounting::debit_lines(&self.ledger, owner, entry.state, resident, compressed);
        });
        self.owners.release_if_empty(owner);

        trace!("Unregistered object {:?} of {:?}", guard.id(), owner);
        self.debug_check(&queues);
        Ok(())
    }

    /// Current purgeability of `id`
    pub fn object_state(&self, id: ObjectId) -> Result<ObjectState, PurgeableError> {
        let queues = self.lock_queues();
        let entry = queues.objects.entry(Self::resolve(&queues, id)?);
        Ok(match (entry.membership, entry.state) {
            (Membership::Volatile { order, group }, _) => ObjectState::Volatile { order, group },
            (Membership::Nonvolatile, AccountingState::Empty) => ObjectState::Empty,
            (Membership::Nonvolatile, _) => ObjectState::Nonvolatile,
        })
    }

    /// Owner of `id`
    pub fn owner_of(&self, id: ObjectId) -> Result<OwnerId, PurgeableError> {
        let queues = self.lock_queues();
        Ok(queues.objects.entry(Self::resolve(&queues, id)?).owner)
    }

    /// Moves the object of `guard` into group `group` of the volatility queue of `order`.
    ///
    /// No token is added or removed, see [`PurgeableManager::make_volatile`] for that.
    /// Obsolete objects always go to group 0.
    pub fn mark_volatile(
        &self,
        guard: &ObjectGuard<O>,
        order: DiscardOrder,
        group: u8,
        purge_when_ripe: bool,
    ) -> Result<(), PurgeableError> {
        check_group(group)?;

        let mut queues = self.lock_queues();
        let index = Self::resolve(&queues, guard.id())?;
        self.mark_volatile_locked(&mut queues, guard, index, order, group, purge_when_ripe);
        self.debug_check(&queues);
        Ok(())
    }

    fn mark_volatile_locked(
        &self,
        queues: &mut PurgeableQueues<O>,
        guard: &ObjectGuard<O>,
        index: u32,
        order: DiscardOrder,
        group: u8,
        purge_when_ripe: bool,
    ) {
        let group = order.effective_group(group);
        let (owner, was_queued, previous_state) = {
            let entry = queues.objects.entry(index);
            (
                entry.owner,
                matches!(entry.membership, Membership::Volatile { .. }),
                entry.state,
            )
        };

        queues.unlink_object(index);
        queues.link_volatile(index, order, group);
        {
            let entry = queues.objects.entry_mut(index);
            entry.state = AccountingState::Volatile;
            entry.purge_when_ripe = purge_when_ripe;
        }

        let resident = guard.resident_pages();
        let compressed = guard.compressed_pages();
        self.owners.with_book(owner, |book| {
            if !was_queued {
                book.object_became_volatile(true);
            }
            accounting::transition_lines(
                &self.ledger,
                owner,
                previous_state,
                AccountingState::Volatile,
                resident,
                compressed,
            );
        });
    }

    /// Moves the object of `guard` back to the nonvolatile list.
    ///
    /// Returns the class the object was queued in, or `None` if it was not volatile.
    /// No token is removed, see [`PurgeableManager::make_nonvolatile`] for that.
    pub fn mark_nonvolatile(&self, guard: &ObjectGuard<O>) -> Result<Option<DiscardOrder>, PurgeableError> {
        let mut queues = self.lock_queues();
        let index = Self::resolve(&queues, guard.id())?;
        let previous = self.mark_nonvolatile_locked(&mut queues, guard, index);
        self.debug_check(&queues);
        Ok(previous.map(|(order, _)| order))
    }

    /// Returns the previous class and whether the object carried a token
    fn mark_nonvolatile_locked(
        &self,
        queues: &mut PurgeableQueues<O>,
        guard: &ObjectGuard<O>,
        index: u32,
    ) -> Option<(DiscardOrder, bool)> {
        let (owner, membership, previous_state, carried_token) = {
            let entry = queues.objects.entry(index);
            (entry.owner, entry.membership, entry.state, entry.purge_when_ripe)
        };

        let previous = match membership {
            Membership::Volatile { order, .. } => {
                queues.unlink_object(index);
                queues.link_nonvolatile(index);
                Some((order, carried_token))
            }
            Membership::Nonvolatile => None,
        };

        {
            let entry = queues.objects.entry_mut(index);
            entry.state = AccountingState::Nonvolatile;
            entry.purge_when_ripe = false;
        }

        let resident = guard.resident_pages();
        let compressed = guard.compressed_pages();
        self.owners.with_book(owner, |book| {
            if previous.is_some() {
                book.object_became_volatile(false);
            }
            accounting::transition_lines(
                &self.ledger,
                owner,
                previous_state,
                AccountingState::Nonvolatile,
                resident,
                compressed,
            );
        });

        previous
    }

    /// Makes the object of `guard` volatile.
    ///
    /// An object that is already volatile leaves its old queue (and gives back its token) first.
    /// If `purge_when_ripe` is set, a token is appended to the queue of `order`. If that fails,
    /// the object is left unchanged.
    pub fn make_volatile(
        &self,
        guard: &ObjectGuard<O>,
        order: DiscardOrder,
        group: u8,
        purge_when_ripe: bool,
    ) -> Result<(), PurgeableError> {
        check_group(group)?;

        let mut queues = self.lock_queues();
        Self::resolve(&queues, guard.id())?;

        let token = if purge_when_ripe {
            let (relocked, id) = self.allocate_token(queues)?;
            queues = relocked;
            Some(id)
        } else {
            None
        };

        // the object cannot be unregistered without its lock, so it is still there
        let index = Self::resolve(&queues, guard.id())?;

        let previous = {
            let entry = queues.objects.entry(index);
            match entry.membership {
                Membership::Volatile { order, .. } => Some((order, entry.purge_when_ripe)),
                Membership::Nonvolatile => None,
            }
        };
        if let Some((previous_order, true)) = previous {
            queues.delete_last_token(previous_order);
        }
        if let Some(id) = token {
            queues.append_allocated_token(order, id);
        }

        self.mark_volatile_locked(&mut queues, guard, index, order, group, purge_when_ripe);

        debug!(
            "Object {:?} is volatile ({} group {}, purge_when_ripe={})",
            guard.id(),
            order,
            order.effective_group(group),
            purge_when_ripe
        );
        self.debug_check(&queues);
        Ok(())
    }

    /// Makes the object of `guard` nonvolatile, returning the class it was queued in.
    ///
    /// A token carried by the object is given back.
    pub fn make_nonvolatile(&self, guard: &ObjectGuard<O>) -> Result<Option<DiscardOrder>, PurgeableError> {
        let mut queues = self.lock_queues();
        let index = Self::resolve(&queues, guard.id())?;

        let previous = self.mark_nonvolatile_locked(&mut queues, guard, index);
        if let Some((order, true)) = previous {
            queues.delete_last_token(order);
        }

        debug!("Object {:?} is nonvolatile", guard.id());
        self.debug_check(&queues);
        Ok(previous.map(|(order, _)| order))
    }

    // ---------------------------------------------------------------------
    // ownership

    /// Moves the object of `guard` and its ledger lines to `new_owner`
    pub fn change_owner(&self, guard: &ObjectGuard<O>, new_owner: OwnerId) -> Result<(), PurgeableError> {
        let mut queues = self.lock_queues();
        let index = Self::resolve(&queues, guard.id())?;

        let (old_owner, volatile, state) = {
            let entry = queues.objects.entry_mut(index);
            let old_owner = entry.owner;
            if old_owner == new_owner {
                return Ok(());
            }
            entry.owner = new_owner;
            (
                old_owner,
                matches!(entry.membership, Membership::Volatile { .. }),
                entry.state,
            )
        };

        let resident = guard.resident_pages();
        let compressed = guard.compressed_pages();
        self.owners.with_book(old_owner, |book| {
            book.remove_object(guard.id(), volatile);
            accounting::debit_lines(&self.ledger, old_owner, state, resident, compressed);
        });
        self.owners.with_book(new_owner, |book| {
            book.add_object(guard.id(), volatile);
            accounting::credit_lines(&self.ledger, new_owner, state, resident, compressed);
        });
        self.owners.release_if_empty(old_owner);
        self.ledger
            .ownership_changed(guard.id(), old_owner, new_owner);

        debug!("Object {:?} moved from {:?} to {:?}", guard.id(), old_owner, new_owner);
        self.debug_check(&queues);
        Ok(())
    }

    /// Moves all objects of the exiting `owner` to [`OwnerId::DISOWNED`].
    ///
    /// Returns the number of moved objects.
    pub fn disown_task(&self, owner: OwnerId) -> Result<usize, PurgeableError> {
        if owner.is_disowned() {
            return Err(PurgeableError::InvalidArgument("owner is already disowned"));
        }

        let mut queues = self.lock_queues();
        let book = self.owners.remove(owner).ok_or(PurgeableError::NotFound)?;

        // the book is not reachable anymore, nobody else can lock it
        let book = core::mem::take(&mut *lock_book(&book));

        let mut moved = Vec::with_capacity(book.objects.len());
        for id in book.objects.iter().copied() {
            let Some(index) = queues.objects.resolve(id) else {
                continue;
            };
            let entry = queues.objects.entry_mut(index);
            debug_assert_eq!(entry.owner, owner);
            entry.owner = OwnerId::DISOWNED;

            // the page counts are read without the object lock, they only have to be
            // the same for the debit and the credit below
            let resident = entry.object.resident_pages();
            let compressed = entry.object.compressed_pages();
            let state = entry.state;
            accounting::debit_lines(&self.ledger, owner, state, resident, compressed);
            moved.push((id, state, resident, compressed));
        }

        self.owners.with_book(OwnerId::DISOWNED, |disowned| {
            disowned.volatile_objects += book.volatile_objects;
            disowned.nonvolatile_objects += book.nonvolatile_objects;
            for (id, state, resident, compressed) in moved.iter().copied() {
                disowned.objects.insert(id);
                accounting::credit_lines(&self.ledger, OwnerId::DISOWNED, state, resident, compressed);
            }
        });
        for (id, ..) in moved.iter() {
            self.ledger.ownership_changed(*id, owner, OwnerId::DISOWNED);
        }

        info!("Disowned {} objects of {:?}", moved.len(), owner);
        self.debug_check(&queues);
        Ok(moved.len())
    }

    /// Charges a change of the page counts of the object of `guard` to its owner.
    ///
    /// Has to be called after the object changed its page counts.
    pub fn pages_changed(
        &self,
        guard: &ObjectGuard<O>,
        resident_delta: i64,
        compressed_delta: i64,
    ) -> Result<(), PurgeableError> {
        let queues = self.lock_queues();
        let entry = queues.objects.entry(Self::resolve(&queues, guard.id())?);
        let (owner, state) = (entry.owner, entry.state);

        self.owners.with_book(owner, |_| {
            accounting::apply_page_delta(&self.ledger, owner, state, resident_delta, compressed_delta);
        });
        Ok(())
    }

    /// Object counts and page totals of `owner`
    pub fn owner_account(&self, owner: OwnerId) -> Result<OwnerAccount, PurgeableError> {
        let queues = self.lock_queues();
        let book = self.owners.existing(owner).ok_or(PurgeableError::NotFound)?;
        let book = lock_book(&book);

        let mut account = OwnerAccount {
            volatile_objects: book.volatile_objects,
            nonvolatile_objects: book.nonvolatile_objects,
            ..Default::default()
        };
        for id in book.objects.iter() {
            let Some(index) = queues.objects.resolve(*id) else {
                continue;
            };
            let object = &queues.objects.entry(index).object;
            let (resident, compressed) = (object.resident_pages(), object.compressed_pages());
            if queues.objects.entry(index).state.is_volatile() {
                account.volatile_pages += resident;
                account.volatile_compressed_pages += compressed;
            } else {
                account.nonvolatile_pages += resident;
                account.nonvolatile_compressed_pages += compressed;
            }
        }
        Ok(account)
    }

    // ---------------------------------------------------------------------
    // statistics

    /// Volatile objects per class and group, optionally only the ones of `target`
    pub fn stats(&self, target: Option<OwnerId>) -> Result<PurgeableStats, PurgeableError> {
        let queues = self.lock_queues();
        if let Some(owner) = target {
            if self.owners.existing(owner).is_none() {
                return Err(PurgeableError::NotFound);
            }
        }

        let page_size = self.config.page_size;
        let count_group = |order: DiscardOrder, group: u8| {
            let mut counts = GroupCounts::default();
            let list = queues.volatility.get(order).group(group);
            for (_, entry) in queues.objects.iter(list) {
                if target.map_or(true, |owner| entry.owner == owner) {
                    counts.add(entry.object.resident_pages() * page_size);
                }
            }
            counts
        };

        let mut stats = PurgeableStats {
            obsolete: count_group(DiscardOrder::Obsolete, 0),
            ..Default::default()
        };
        for group in 0..VOLATILE_GROUP_COUNT {
            stats.fifo[group] = count_group(DiscardOrder::Fifo, group as u8);
            stats.lifo[group] = count_group(DiscardOrder::Lifo, group as u8);
        }
        Ok(stats)
    }

    pub fn counters(&self) -> PurgeCounters {
        self.lock_queues().counters()
    }
}

fn check_group(group: u8) -> Result<(), PurgeableError> {
    if (group as usize) < VOLATILE_GROUP_COUNT {
        Ok(())
    } else {
        Err(PurgeableError::InvalidArgument("volatility group out of range"))
    }
}
