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

use core::{mem::ManuallyDrop, ops::Deref};
use std::{sync::Arc, thread};
use try_lock::Locked;

use crate::{modules::memory_object::PurgeableObject, ObjectId};

/// Shared reference to an object registered at a [`crate::PurgeableManager`].
pub struct ObjectHandle<O: PurgeableObject> {
    id: ObjectId,
    object: Arc<O>,
}

impl<O: PurgeableObject> Clone for ObjectHandle<O> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            object: Arc::clone(&self.object),
        }
    }
}

impl<O: PurgeableObject> ObjectHandle<O> {
    pub(crate) fn new(id: ObjectId, object: Arc<O>) -> Self {
        Self { id, object }
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn object(&self) -> &O {
        &self.object
    }

    /// Tries to acquire the exclusive lock of this object without blocking.
    pub fn try_lock(&self) -> Option<ObjectGuard<O>> {
        ObjectGuard::try_new(self.id, &self.object)
    }

    /// Acquires the exclusive lock of this object, spinning until it is free.
    ///
    /// **Note**: Never call this while holding a guard of the same object.
    pub fn lock(&self) -> ObjectGuard<O> {
        loop {
            if let Some(guard) = self.try_lock() {
                return guard;
            }
            thread::yield_now();
        }
    }
}

/// Proof that the exclusive lock of an object is held.
///
/// The lock is released once this guard is dropped.
pub struct ObjectGuard<O: PurgeableObject> {
    guard: ManuallyDrop<Locked<'static, ()>>,
    handle: ObjectHandle<O>,
}

impl<O: PurgeableObject> ObjectGuard<O> {
    pub(crate) fn try_new(id: ObjectId, object: &Arc<O>) -> Option<Self> {
        let locked = object.exclusive_lock().try_lock()?;

        // SAFETY: the lock lives inside of `object`, which is kept alive by `handle`.
        // `guard` is always dropped before `handle` (see Drop impl).
        let locked: Locked<'static, ()> = unsafe { core::mem::transmute(locked) };

        Some(Self {
            guard: ManuallyDrop::new(locked),
            handle: ObjectHandle::new(id, Arc::clone(object)),
        })
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.handle.id
    }

    #[inline]
    pub fn handle(&self) -> &ObjectHandle<O> {
        &self.handle
    }
}

impl<O: PurgeableObject> Deref for ObjectGuard<O> {
    type Target = O;

    fn deref(&self) -> &Self::Target {
        &self.handle.object
    }
}

impl<O: PurgeableObject> Drop for ObjectGuard<O> {
    fn drop(&mut self) {
        // release the lock before the reference to the object
        unsafe { ManuallyDrop::drop(&mut self.guard) }
    }
}
