use thiserror::Error;

/// Errors returned by [`crate::PurgeableManager`].
///
/// Broken invariants of the token or object queues are not reported through this type,
/// they are assertion failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PurgeableError {
    /// The token arena could not grow, either because the token storage module
    /// ran out of memory or because the configured maximum token count was reached.
    #[error("token arena could not grow")]
    ResourceShortage,

    /// A thread waiting for the token arena to grow was released before the
    /// arena grew.
    #[error("waiting for token arena growth was aborted")]
    Aborted,

    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Unknown or already unregistered object, or an owner without objects.
    #[error("object or owner not found")]
    NotFound,
}
