use crate::{token::Token, PurgeableError};
use core::mem::size_of;

/// Tunables of a [`crate::PurgeableManager`].
#[derive(Debug, Clone)]
pub struct PurgeableConfig {
    /// How many objects a candidate scan looks at before it settles
    /// for the best object found so far.
    ///
    /// If no lockable object was found after this many objects,
    /// the scan continues until it finds one.
    pub scan_limit: usize,

    /// By how many bytes the token arena grows at once.
    pub token_growth_bytes: usize,

    /// Upper bound for the number of token slots (including the reserved slot 0).
    pub max_tokens: usize,

    /// If the global pending page counter exceeds this value, the aging sweep
    /// flushes it into the token queues instead of waiting for the next append.
    pub pending_flush_threshold: i64,

    /// Size of a page in bytes, used for reporting only.
    pub page_size: u64,

    /// How often an eviction pass may fail to lock an object before
    /// giving up on it.
    pub max_lock_collisions: u32,
}

impl Default for PurgeableConfig {
    fn default() -> Self {
        Self {
            scan_limit: 64,
            token_growth_bytes: 4096,
            max_tokens: u32::MAX as usize,
            pending_flush_threshold: (i32::MAX >> 1) as i64,
            page_size: 4096,
            max_lock_collisions: 1000,
        }
    }
}

impl PurgeableConfig {
    /// Number of token slots added by one growth step
    pub(crate) fn tokens_per_growth(&self) -> usize {
        self.token_growth_bytes / size_of::<Token>()
    }

    pub(crate) fn validate(&self) -> Result<(), PurgeableError> {
        if self.scan_limit == 0 {
            return Err(PurgeableError::InvalidArgument("scan_limit must not be zero"));
        }
        if self.tokens_per_growth() == 0 {
            return Err(PurgeableError::InvalidArgument(
                "token_growth_bytes is smaller than a single token",
            ));
        }
        if self.max_tokens < 2 || self.max_tokens > u32::MAX as usize {
            return Err(PurgeableError::InvalidArgument(
                "max_tokens has to be in [2, u32::MAX]",
            ));
        }
        if self.pending_flush_threshold <= 0 {
            return Err(PurgeableError::InvalidArgument(
                "pending_flush_threshold has to be positive",
            ));
        }
        if self.page_size == 0 {
            return Err(PurgeableError::InvalidArgument("page_size must not be zero"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::PurgeableConfig;

    #[test]
    fn test_default_config_is_valid() {
        let config = PurgeableConfig::default();
        assert!(config.validate().is_ok());

        // a page worth of tokens, 12 bytes each
        assert_eq!(config.tokens_per_growth(), 341);
    }

    #[test]
    fn test_invalid_config() {
        let config = PurgeableConfig {
            token_growth_bytes: 4,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PurgeableConfig {
            max_tokens: 1,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = PurgeableConfig {
            scan_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
