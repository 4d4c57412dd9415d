use std::sync::Arc;

/// Result type used by the cache and the store boundary.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced while loading flags.
///
/// Flag evaluation itself never fails: missing flags, disabled flags and unmatched rules are all
/// reported as a [`Reason`](crate::Reason). Errors only come out of the [`FlagStore`] boundary
/// and the [`FlagCache`] that sits in front of it.
///
/// [`FlagStore`]: crate::FlagStore
/// [`FlagCache`]: crate::FlagCache
#[derive(thiserror::Error, Debug, Clone)]
#[non_exhaustive]
pub enum Error {
    /// The flag store failed to answer a query.
    #[error("flag store unavailable")]
    // Backend errors are rarely clonable, and a single failed load is shared by every waiter.
    Store(#[source] Arc<dyn std::error::Error + Send + Sync>),

    /// A flag document could not be parsed.
    #[error("error parsing flag document")]
    Parse(#[source] Arc<serde_json::Error>),

    /// The thread running a cache refresh panicked before finishing the load.
    #[error("cache refresh panicked")]
    RefreshPanicked,

    /// A thread panicked while holding a cache lock.
    #[error("cache lock poisoned")]
    Poisoned,
}

impl Error {
    /// Wrap any backend error as a store failure.
    pub fn store(err: impl std::error::Error + Send + Sync + 'static) -> Error {
        Error::Store(Arc::new(err))
    }
}

impl From<serde_json::Error> for Error {
    fn from(value: serde_json::Error) -> Self {
        Error::Parse(Arc::new(value))
    }
}
