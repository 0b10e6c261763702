//! Eviction policies and the clock they are evaluated against

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Source of the current time for eviction decisions
pub trait Clock: Send + Sync + fmt::Debug {
    fn now(&self) -> Instant;
}

/// Wall clock backed by [`Instant::now`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock
///
/// Clones share the same time, so a test can keep one handle and give
/// another to the pool.
///
/// # Examples
///
/// ```
/// use esox_connpool::{Clock, ManualClock};
/// use std::time::Duration;
///
/// let clock = ManualClock::new();
/// let start = clock.now();
/// clock.advance(Duration::from_secs(5));
/// assert_eq!(clock.now() - start, Duration::from_secs(5));
/// ```
#[derive(Debug, Clone)]
pub struct ManualClock {
    now: Arc<Mutex<Instant>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            now: Arc::new(Mutex::new(Instant::now())),
        }
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        *self.now.lock() += by;
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.now.lock()
    }
}

/// Eviction policy for pooled connections
///
/// # Examples
///
/// ```
/// use esox_connpool::EvictionPolicy;
/// use std::time::Duration;
///
/// let policy = EvictionPolicy::from_timeouts(Duration::from_secs(30), Duration::ZERO);
/// assert!(matches!(policy, EvictionPolicy::IdleTimeout(_)));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EvictionPolicy {
    /// No eviction
    #[default]
    None,

    /// Lifetime: connections expire a fixed duration after creation
    Lifetime(Duration),

    /// Idle timeout: connections expire after not being handed out
    IdleTimeout(Duration),

    /// Combined: lifetime or idle timeout, whichever trips first
    Combined {
        lifetime: Duration,
        idle_timeout: Duration,
    },
}

impl EvictionPolicy {
    /// Build a policy from raw timeouts, where zero disables a rule
    pub fn from_timeouts(idle_timeout: Duration, lifetime: Duration) -> Self {
        match (idle_timeout.is_zero(), lifetime.is_zero()) {
            (true, true) => EvictionPolicy::None,
            (false, true) => EvictionPolicy::IdleTimeout(idle_timeout),
            (true, false) => EvictionPolicy::Lifetime(lifetime),
            (false, false) => EvictionPolicy::Combined {
                lifetime,
                idle_timeout,
            },
        }
    }

    /// Decide whether a connection is stale at `now`
    ///
    /// Idle timeout is checked first. Reaching a threshold exactly counts as stale.
    pub fn check(&self, meta: &ConnectionMetadata, now: Instant) -> Option<EvictionReason> {
        let idle_expired = |timeout: Duration| meta.idle_for(now) >= timeout;
        let lifetime_expired = |lifetime: Duration| meta.age(now) >= lifetime;

        match *self {
            EvictionPolicy::None => None,
            EvictionPolicy::IdleTimeout(timeout) => {
                idle_expired(timeout).then_some(EvictionReason::IdleTimeout)
            }
            EvictionPolicy::Lifetime(lifetime) => {
                lifetime_expired(lifetime).then_some(EvictionReason::Lifetime)
            }
            EvictionPolicy::Combined {
                lifetime,
                idle_timeout,
            } => {
                if idle_expired(idle_timeout) {
                    Some(EvictionReason::IdleTimeout)
                } else if lifetime_expired(lifetime) {
                    Some(EvictionReason::Lifetime)
                } else {
                    None
                }
            }
        }
    }
}

/// Why a connection was retired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvictionReason {
    IdleTimeout,
    Lifetime,
}

impl fmt::Display for EvictionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvictionReason::IdleTimeout => f.write_str("idle timeout"),
            EvictionReason::Lifetime => f.write_str("lifetime"),
        }
    }
}

/// Timestamps tracked for every pooled connection
///
/// `created_at <= last_used_at` holds as long as the clock is monotonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConnectionMetadata {
    created_at: Instant,
    last_used_at: Instant,
}

impl ConnectionMetadata {
    pub(crate) fn new(now: Instant) -> Self {
        Self {
            created_at: now,
            last_used_at: now,
        }
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.last_used_at = now.max(self.created_at);
    }

    pub fn created_at(&self) -> Instant {
        self.created_at
    }

    pub fn last_used_at(&self) -> Instant {
        self.last_used_at
    }

    fn age(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.created_at)
    }

    fn idle_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_used_at)
    }
}
