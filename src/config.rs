//! Pool configuration options

use std::time::Duration;

use crate::errors::{PoolError, PoolResult};

/// Configuration for connection pool behavior
///
/// A zero `idle_timeout` or `lifetime` disables that eviction rule.
///
/// # Examples
///
/// ```
/// use esox_connpool::PoolConfiguration;
/// use std::time::Duration;
///
/// let config = PoolConfiguration::new()
///     .with_capacity(16)
///     .with_initial_len(4)
///     .with_idle_timeout(Duration::from_secs(30))
///     .with_lifetime(Duration::from_secs(600));
///
/// assert_eq!(config.capacity, 16);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(default))]
pub struct PoolConfiguration {
    /// Number of connections created eagerly at construction
    #[cfg_attr(feature = "serde", serde(alias = "length"))]
    pub initial_len: usize,

    /// Maximum number of idle connections retained by the pool
    pub capacity: usize,

    /// Evict a connection that has not been handed out for this long
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub idle_timeout: Duration,

    /// Evict a connection this long after it was created, however recently used
    #[cfg_attr(feature = "serde", serde(with = "humantime_serde"))]
    pub lifetime: Duration,
}

impl Default for PoolConfiguration {
    fn default() -> Self {
        Self {
            initial_len: 0,
            capacity: 10,
            idle_timeout: Duration::ZERO,
            lifetime: Duration::ZERO,
        }
    }
}

impl PoolConfiguration {
    /// Create a new configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of connections created at construction
    pub fn with_initial_len(mut self, len: usize) -> Self {
        self.initial_len = len;
        self
    }

    /// Set the maximum number of idle connections
    ///
    /// # Examples
    ///
    /// ```
    /// use esox_connpool::PoolConfiguration;
    ///
    /// let config = PoolConfiguration::new().with_capacity(50);
    /// assert_eq!(config.capacity, 50);
    /// ```
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Set the idle timeout; `Duration::ZERO` disables it
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Set the maximum connection lifetime; `Duration::ZERO` disables it
    pub fn with_lifetime(mut self, lifetime: Duration) -> Self {
        self.lifetime = lifetime;
        self
    }

    /// Check the configuration before any connection is created
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] if `capacity` is zero or `initial_len`
    /// exceeds `capacity`.
    pub fn validate(&self) -> PoolResult<()> {
        if self.capacity == 0 {
            return Err(PoolError::config("capacity must be greater than zero"));
        }
        if self.initial_len > self.capacity {
            return Err(PoolError::config(format!(
                "initial length {} exceeds capacity {}",
                self.initial_len, self.capacity
            )));
        }
        Ok(())
    }
}
