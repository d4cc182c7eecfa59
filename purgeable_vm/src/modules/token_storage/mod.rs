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

mod vec_storage;

pub use vec_storage::VecTokenStorageModule;

use crate::Token;

/// Memory source the token arena grows from.
pub trait TokenStorageModule: Send + Sync {
    /// Returns an empty vector with room for at least `capacity` tokens.
    ///
    /// Always called without holding any lock of the purgeable subsystem,
    /// so implementations may block.
    fn allocate(&self, capacity: usize) -> Result<Vec<Token>, ()>;
}
