use core::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use try_lock::TryLock;

use super::{PurgeFlags, PurgeableObject};

/// In-memory object that only keeps track of its page counts.
pub struct SimplePurgeableObject {
    lock: TryLock<()>,
    resident_pages: AtomicU64,
    compressed_pages: AtomicU64,
    purge_count: AtomicU32,
    forced_purge_count: AtomicU32,
}

impl SimplePurgeableObject {
    pub fn new(resident_pages: u64, compressed_pages: u64) -> Self {
        Self {
            lock: TryLock::new(()),
            resident_pages: AtomicU64::new(resident_pages),
            compressed_pages: AtomicU64::new(compressed_pages),
            purge_count: AtomicU32::new(0),
            forced_purge_count: AtomicU32::new(0),
        }
    }

    /// Changes the resident page count and returns the difference to the old value.
    ///
    /// Report the difference with `PurgeableManager::pages_changed`.
    pub fn set_resident_pages(&self, pages: u64) -> i64 {
        let old = self.resident_pages.swap(pages, Ordering::SeqCst);
        pages as i64 - old as i64
    }

    /// Same as [`SimplePurgeableObject::set_resident_pages`] for compressed pages
    pub fn set_compressed_pages(&self, pages: u64) -> i64 {
        let old = self.compressed_pages.swap(pages, Ordering::SeqCst);
        pages as i64 - old as i64
    }

    /// How often this object was purged
    pub fn purge_count(&self) -> u32 {
        self.purge_count.load(Ordering::SeqCst)
    }

    pub fn forced_purge_count(&self) -> u32 {
        self.forced_purge_count.load(Ordering::SeqCst)
    }
}

impl PurgeableObject for SimplePurgeableObject {
    fn exclusive_lock(&self) -> &TryLock<()> {
        &self.lock
    }

    fn resident_pages(&self) -> u64 {
        self.resident_pages.load(Ordering::SeqCst)
    }

    fn compressed_pages(&self) -> u64 {
        self.compressed_pages.load(Ordering::SeqCst)
    }

    fn purge(&self, flags: PurgeFlags) -> u64 {
        debug_assert!(
            self.lock.try_lock().is_none(),
            "object purged without holding its lock"
        );

        let resident = self.resident_pages.swap(0, Ordering::SeqCst);
        // compressed pages are dropped as well, but they are not resident memory
        self.compressed_pages.store(0, Ordering::SeqCst);

        self.purge_count.fetch_add(1, Ordering::SeqCst);
        if flags.forced {
            self.forced_purge_count.fetch_add(1, Ordering::SeqCst);
        }

        resident
    }
}
