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

use try_lock::TryLock;

mod simple;

pub use simple::SimplePurgeableObject;

/// Options passed to [`PurgeableObject::purge`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PurgeFlags {
    /// The object was purged before its token was ripe
    pub forced: bool,

    /// The purge must not block (e.g. it is called from the page-out path)
    pub no_wait: bool,
}

/// A lockable memory object whose pages can be discarded.
///
/// Page contents, residency and compression are managed by the implementor,
/// the purgeable subsystem only reads page counts and calls [`PurgeableObject::purge`].
pub trait PurgeableObject: Send + Sync {
    /// Exclusive lock of this object.
    ///
    /// The purgeable subsystem only ever uses `try_lock` on it.
    fn exclusive_lock(&self) -> &TryLock<()>;

    /// Number of resident pages
    fn resident_pages(&self) -> u64;

    /// Number of compressed pages
    fn compressed_pages(&self) -> u64;

    /// Discards all pages of this object.
    ///
    /// Called with the object lock held and without any other lock of the
    /// purgeable subsystem. Returns the number of reclaimed resident pages.
    fn purge(&self, flags: PurgeFlags) -> u64;
}
