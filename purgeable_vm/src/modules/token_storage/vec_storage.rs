use core::{
    mem::size_of,
    sync::atomic::{AtomicUsize, Ordering},
};

use log::warn;

use super::TokenStorageModule;
use crate::Token;

/// Allocates token storage from the global allocator.
pub struct VecTokenStorageModule {
    /// Largest allocation in bytes this module hands out
    max_bytes: usize,

    /// Number of successful allocations
    allocations: AtomicUsize,
}

impl VecTokenStorageModule {
    pub fn new() -> Self {
        Self::with_limit(usize::MAX)
    }

    /// Fails every allocation bigger than `max_bytes`
    pub fn with_limit(max_bytes: usize) -> Self {
        Self {
            max_bytes,
            allocations: AtomicUsize::new(0),
        }
    }

    pub fn allocations(&self) -> usize {
        self.allocations.load(Ordering::SeqCst)
    }
}

impl Default for VecTokenStorageModule {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenStorageModule for VecTokenStorageModule {
    fn allocate(&self, capacity: usize) -> Result<Vec<Token>, ()> {
        let bytes = capacity.checked_mul(size_of::<Token>()).ok_or(())?;
        if bytes > self.max_bytes {
            warn!(
                "Token storage of {} bytes exceeds the limit of {} bytes",
                bytes, self.max_bytes
            );
            return Err(());
        }

        let mut storage = Vec::new();
        storage.try_reserve_exact(capacity).map_err(|_| ())?;

        self.allocations.fetch_add(1, Ordering::SeqCst);
        Ok(storage)
    }
}

#[cfg(test)]
mod test {
    use super::VecTokenStorageModule;
    use crate::modules::token_storage::TokenStorageModule;

    #[test]
    fn test_limit() {
        let storage = VecTokenStorageModule::with_limit(120);

        let tokens = storage.allocate(10).unwrap();
        assert!(tokens.is_empty());
        assert!(tokens.capacity() >= 10);

        assert!(storage.allocate(11).is_err());
        assert_eq!(storage.allocations(), 1);
    }
}
