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

//! Choosing and purging victims.

use log::{debug, trace, warn};

use crate::{
    accounting,
    modules::{
        ledger::LedgerModule,
        memory_object::{PurgeFlags, PurgeableObject},
        token_storage::TokenStorageModule,
    },
    object_table::{AccountingState, Membership},
    purgeable_queues::PurgeableQueues,
    util::collision_pause,
    DiscardOrder, ObjectGuard, OwnerId, PurgeSummary, PurgeableManager, VOLATILE_GROUP_COUNT,
};

/// A locked object that was taken out of its volatility queue and waits to be purged
pub(crate) struct Victim<O: PurgeableObject> {
    guard: ObjectGuard<O>,
    order: DiscardOrder,

    /// The object carried a token (which the caller still has to consume)
    carried_token: bool,
}

impl<O: PurgeableObject> PurgeableQueues<O> {
    /// Scans `group` of `order` for the least important object that can be locked.
    ///
    /// After `scan_limit` objects the best object found so far is taken. If no object
    /// could be locked up to this point, the scan goes on until one is found.
    /// An object with importance 0 ends the scan right away.
    fn scan_group(
        &self,
        order: DiscardOrder,
        group: u8,
        require_ripe: bool,
        scan_limit: usize,
        importance: impl Fn(OwnerId) -> i32,
    ) -> Option<(u32, ObjectGuard<O>)> {
        let list = self.volatility.get(order).group(group);

        let mut best: Option<(u32, ObjectGuard<O>, i32)> = None;
        let mut examined = 0;
        let mut curr = list.head();

        while let Some(index) = curr {
            if examined >= scan_limit && best.is_some() {
                break;
            }
            examined += 1;
            curr = self.objects.next_of(index);

            let entry = self.objects.entry(index);
            if require_ripe && !entry.purge_when_ripe {
                continue;
            }

            let object_importance = if entry.owner.is_disowned() {
                0
            } else {
                importance(entry.owner)
            };
            let best_importance = best.as_ref().map_or(i32::MAX, |(_, _, importance)| *importance);
            if object_importance >= best_importance {
                continue;
            }

            if let Some(guard) = ObjectGuard::try_new(self.objects.id_at(index), &entry.object) {
                // replacing the previous best releases its lock
                best = Some((index, guard, object_importance));
                if object_importance == 0 {
                    break;
                }
            }
        }

        if examined > scan_limit {
            trace!("Scanned {} objects of {} group {}", examined, order, group);
        }
        best.map(|(index, guard, _)| (index, guard))
    }
}

impl<O: PurgeableObject, L: LedgerModule, T: TokenStorageModule> PurgeableManager<O, L, T> {
    /// Finds and locks a victim in `group` of `order` and moves it to the nonvolatile list.
    ///
    /// The token of the victim is not consumed, that is up to the caller.
    pub(crate) fn find_and_lock_candidate(
        &self,
        queues: &mut PurgeableQueues<O>,
        order: DiscardOrder,
        group: u8,
        require_ripe: bool,
    ) -> Option<Victim<O>> {
        let (index, guard) = queues.scan_group(order, group, require_ripe, self.config.scan_limit, |owner| {
            self.ledger.importance(owner)
        })?;
        Some(self.detach_victim(queues, index, guard))
    }

    /// Moves the locked object `index` from its volatility queue to the nonvolatile list.
    ///
    /// From now on it is accounted as purged.
    fn detach_victim(&self, queues: &mut PurgeableQueues<O>, index: u32, guard: ObjectGuard<O>) -> Victim<O> {
        let (owner, order, carried_token) = {
            let entry = queues.objects.entry(index);
            let Membership::Volatile { order, .. } = entry.membership else {
                panic!("victim {:?} is not volatile", guard.id());
            };
            (entry.owner, order, entry.purge_when_ripe)
        };

        queues.unlink_object(index);
        queues.link_nonvolatile(index);
        {
            let entry = queues.objects.entry_mut(index);
            entry.state = AccountingState::Empty;
            entry.purge_when_ripe = false;
        }

        self.owners
            .with_book(owner, |book| book.object_became_volatile(false));

        Victim {
            guard,
            order,
            carried_token,
        }
    }

    /// Purges `victim` and charges the reclaimed pages. Has to be called without the queue lock.
    fn purge_victim(&self, victim: Victim<O>, forced: bool, flags: PurgeFlags) -> u64 {
        let guard = victim.guard;
        let resident_before = guard.resident_pages();
        let compressed_before = guard.compressed_pages();

        let flags = PurgeFlags {
            forced: forced || flags.forced,
            ..flags
        };
        let reclaimed = guard.purge(flags);

        let resident_freed = resident_before.saturating_sub(guard.resident_pages());
        let compressed_freed = compressed_before.saturating_sub(guard.compressed_pages());

        let mut queues = self.lock_queues();
        queues.counters.purged_objects += 1;
        queues.counters.purged_pages += reclaimed;
        if flags.forced {
            queues.counters.forced_purges += 1;
        }

        if let Some(index) = queues.objects.resolve(guard.id()) {
            let owner = queues.objects.entry(index).owner;
            self.owners.with_book(owner, |_| {
                accounting::debit_lines(
                    &self.ledger,
                    owner,
                    AccountingState::Empty,
                    resident_freed,
                    compressed_freed,
                );
            });
        }

        debug!(
            "Purged object {:?} ({}, forced={}, {} pages)",
            guard.id(),
            victim.order,
            flags.forced,
            reclaimed
        );
        self.debug_check(&queues);
        reclaimed
    }

    /// Purges a single object, see [`PurgeableManager::purge_one_with_flags`].
    pub fn purge_one(&self, force_below_group: u8) -> bool {
        self.purge_one_with_flags(force_below_group, PurgeFlags::default())
    }

    /// Purges a single object.
    ///
    /// Classes are visited in the order obsolete, FIFO, LIFO, groups in ascending order.
    /// Only objects that carry a token are purged while their class has a ripe token.
    /// Groups below `force_below_group` are purged even without a ripe token.
    ///
    /// Returns `false` if nothing could be purged.
    pub fn purge_one_with_flags(&self, force_below_group: u8, flags: PurgeFlags) -> bool {
        let mut queues = self.lock_queues();
        let Some((victim, forced)) = self.select_victim(&mut queues, force_below_group) else {
            trace!("Nothing to purge (force_below_group={})", force_below_group);
            return false;
        };
        self.debug_check(&queues);
        drop(queues);

        self.purge_victim(victim, forced, flags);
        true
    }

    fn select_victim(&self, queues: &mut PurgeableQueues<O>, force_below_group: u8) -> Option<(Victim<O>, bool)> {
        for order in DiscardOrder::ALL {
            if force_below_group == 0 && !queues.tokens.get(order).has_ripe_token() {
                // nothing ripe and nothing to force
                continue;
            }

            for group in 0..VOLATILE_GROUP_COUNT as u8 {
                if !queues.tokens.get(order).has_ripe_token() {
                    if group >= force_below_group {
                        break;
                    }

                    if let Some(victim) = self.find_and_lock_candidate(queues, order, group, false) {
                        if victim.carried_token {
                            queues.delete_first_token(order);
                        }
                        debug!("Forced purge in {} group {}", order, group);
                        return Some((victim, true));
                    }
                    continue;
                }

                if let Some(victim) = self.find_and_lock_candidate(queues, order, group, true) {
                    queues.take_ripe_token(order);
                    return Some((victim, false));
                }

                // this class has a ripe token, but maybe only the other aging class has ripe objects
                if let Some(partner) = order.migration_partner() {
                    if let Some(victim) = self.find_and_lock_candidate(queues, partner, group, true) {
                        queues.take_ripe_token_with_fallback(partner, order);
                        return Some((victim, false));
                    }
                }
            }
        }
        None
    }

    /// Purges every volatile object.
    ///
    /// Objects whose lock is held elsewhere are retried after a pause until
    /// `max_lock_collisions` is reached.
    pub fn purge_all(&self) -> PurgeSummary {
        self.purge_all_with_flags(PurgeFlags::default())
    }

    pub fn purge_all_with_flags(&self, flags: PurgeFlags) -> PurgeSummary {
        let mut summary = PurgeSummary::default();
        let mut collisions = 0;

        loop {
            let mut queues = self.lock_queues();

            let mut victim = None;
            let mut blocked = false;
            'scan: for order in DiscardOrder::ALL {
                for group in 0..VOLATILE_GROUP_COUNT as u8 {
                    if queues.volatility.get(order).group(group).is_empty() {
                        continue;
                    }

                    match self.find_and_lock_candidate(&mut queues, order, group, false) {
                        Some(found) => {
                            if found.carried_token {
                                // oldest token first, ripe tokens are in front
                                queues.delete_first_token(order);
                            }
                            victim = Some(found);
                            break 'scan;
                        }
                        // every object of this group is locked right now
                        None => blocked = true,
                    }
                }
            }
            drop(queues);

            match victim {
                Some(victim) => {
                    summary.pages += self.purge_victim(victim, false, flags);
                    summary.objects += 1;
                    collisions = 0;
                }
                None if blocked => {
                    collisions += 1;
                    if collisions >= self.config.max_lock_collisions {
                        warn!("Giving up purging all objects after {} lock collisions", collisions);
                        break;
                    }
                    collision_pause(collisions);
                }
                None => break,
            }
        }

        debug!("Purged all: {} objects, {} pages", summary.objects, summary.pages);
        summary
    }

    /// Purges all volatile objects of `owner`, e.g. because it exits.
    ///
    /// Returns the number of reclaimed pages.
    pub fn purge_task_owned(&self, owner: OwnerId) -> u64 {
        let ids: Vec<_> = match self.owners.existing(owner) {
            Some(book) => accounting::lock_book(&book).objects.iter().copied().collect(),
            None => return 0,
        };

        let mut pages = 0;
        let mut purged = 0;
        for id in ids {
            let mut collisions = 0;
            loop {
                let mut queues = self.lock_queues();

                let Some(index) = queues.objects.resolve(id) else {
                    break;
                };
                let entry = queues.objects.entry(index);
                if entry.owner != owner || !matches!(entry.membership, Membership::Volatile { .. }) {
                    break;
                }

                match ObjectGuard::try_new(id, &entry.object) {
                    Some(guard) => {
                        let victim = self.detach_victim(&mut queues, index, guard);
                        if victim.carried_token {
                            queues.delete_first_token(victim.order);
                        }
                        drop(queues);

                        pages += self.purge_victim(victim, false, PurgeFlags::default());
                        purged += 1;
                        break;
                    }
                    None => {
                        drop(queues);
                        collisions += 1;
                        if collisions >= self.config.max_lock_collisions {
                            warn!("Skipping object {:?} of {:?}: lock is held", id, owner);
                            break;
                        }
                        collision_pause(collisions);
                    }
                }
            }
        }

        debug!("Purged {} objects ({} pages) of {:?}", purged, pages, owner);
        pages
    }
}
