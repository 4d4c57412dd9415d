use std::time::Duration;

/// Configuration for [`FlagCache`](crate::FlagCache).
// Not implementing `Copy` as we may add non-copyable fields in the future.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of the last full load before a lookup forces a new one.
    ///
    /// Defaults to [`CacheConfig::DEFAULT_TTL`]. A zero TTL reloads on every lookup.
    pub ttl: Duration,
}

impl CacheConfig {
    /// Default value for [`CacheConfig::ttl`].
    pub const DEFAULT_TTL: Duration = Duration::from_secs(60);

    /// Create a new `CacheConfig` using default configuration.
    pub fn new() -> CacheConfig {
        CacheConfig::default()
    }

    /// Update the staleness window with `ttl`.
    ///
    /// ```
    /// # use std::time::Duration;
    /// # use flagwise::CacheConfig;
    /// let config = CacheConfig::new().with_ttl(Duration::from_secs(10));
    /// assert_eq!(config.ttl, Duration::from_secs(10));
    /// ```
    pub fn with_ttl(mut self, ttl: Duration) -> CacheConfig {
        self.ttl = ttl;
        self
    }
}

impl Default for CacheConfig {
    fn default() -> CacheConfig {
        CacheConfig {
            ttl: CacheConfig::DEFAULT_TTL,
        }
    }
}
