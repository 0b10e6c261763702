//! Core connection pool implementation

use crate::config::PoolConfiguration;
use crate::connection::{ConnectionFactory, PooledConnection};
use crate::errors::{PoolError, PoolResult};
use crate::eviction::{Clock, EvictionPolicy, SystemClock};
use crate::metrics::{MetricsTracker, PoolMetrics};

use crossbeam::queue::ArrayQueue;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Idle connections plus the lifecycle flag, guarded together
struct IdleSet<C> {
    queue: ArrayQueue<PooledConnection<C>>,
    closed: bool,
}

/// Thread-safe pool of reusable client connections
///
/// Acquire and release never wait on other callers: an empty idle set is
/// answered by the factory and a full one by closing the returned
/// connection. `capacity` therefore bounds retained idle connections only,
/// not the number checked out at once.
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ConnectionPool};
/// use std::time::Duration;
///
/// struct Channel;
/// impl Connection for Channel {
///     fn close(self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let pool = ConnectionPool::new(|| Ok::<_, BoxError>(Channel), 2, 5, Duration::ZERO, Duration::ZERO).unwrap();
/// assert_eq!(pool.len(), 2);
///
/// let first = pool.acquire().unwrap();
/// let _second = pool.acquire().unwrap();
/// assert_eq!(pool.len(), 0);
///
/// pool.release(first, false).unwrap();
/// assert_eq!(pool.len(), 1);
///
/// pool.close().unwrap();
/// assert!(pool.acquire().is_err());
/// ```
pub struct ConnectionPool<F: ConnectionFactory> {
    idle: RwLock<IdleSet<F::Connection>>,
    factory: F,
    policy: EvictionPolicy,
    capacity: usize,
    clock: Arc<dyn Clock>,
    metrics: MetricsTracker,
}

impl<F: ConnectionFactory> ConnectionPool<F> {
    /// Create a pool holding up to `capacity` idle connections, `length` of them created now
    ///
    /// A zero `idle_timeout` or `lifetime` disables that eviction rule.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Config`] for `capacity == 0` or `length > capacity`,
    /// and [`PoolError::Create`] if the factory fails while pre-warming.
    pub fn new(
        factory: F,
        length: usize,
        capacity: usize,
        idle_timeout: Duration,
        lifetime: Duration,
    ) -> PoolResult<Self> {
        let config = PoolConfiguration::new()
            .with_initial_len(length)
            .with_capacity(capacity)
            .with_idle_timeout(idle_timeout)
            .with_lifetime(lifetime);
        Self::with_config(factory, config)
    }

    /// Create a pool from a configuration
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionPool::new`].
    pub fn with_config(factory: F, config: PoolConfiguration) -> PoolResult<Self> {
        Self::with_clock(factory, config, Arc::new(SystemClock))
    }

    /// Create a pool that reads time from `clock` for eviction decisions
    ///
    /// # Errors
    ///
    /// Same as [`ConnectionPool::new`].
    pub fn with_clock(
        factory: F,
        config: PoolConfiguration,
        clock: Arc<dyn Clock>,
    ) -> PoolResult<Self> {
        config.validate()?;

        let pool = Self {
            idle: RwLock::new(IdleSet {
                queue: ArrayQueue::new(config.capacity),
                closed: false,
            }),
            factory,
            policy: EvictionPolicy::from_timeouts(config.idle_timeout, config.lifetime),
            capacity: config.capacity,
            clock,
            metrics: MetricsTracker::new(),
        };
        pool.warmup(config.initial_len)?;

        debug!(
            capacity = pool.capacity,
            idle = pool.len(),
            policy = ?pool.policy,
            "connection pool created"
        );
        Ok(pool)
    }

    /// Pre-create `count` connections; on failure every one made so far is closed
    fn warmup(&self, count: usize) -> PoolResult<()> {
        let mut created = Vec::with_capacity(count);
        for _ in 0..count {
            match self.create_connection() {
                Ok(conn) => created.push(conn),
                Err(err) => {
                    debug!(created = created.len(), "warm-up failed, closing created connections");
                    created.into_iter().for_each(|conn| self.close_connection(conn));
                    return Err(err);
                }
            }
        }

        let idle = self.idle.read();
        for conn in created {
            if let Err(conn) = idle.queue.push(conn) {
                self.close_connection(conn);
            }
        }
        Ok(())
    }

    /// Borrow a connection, reusing an idle one when it is still fresh
    ///
    /// Never waits. An empty idle set, or a stale idle connection, is
    /// answered with a new connection from the factory.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] after [`close`](Self::close), and
    /// [`PoolError::Create`] if the factory fails.
    pub fn acquire(&self) -> PoolResult<PooledConnection<F::Connection>> {
        let idle = self.idle.read();
        if idle.closed {
            return Err(PoolError::Closed);
        }

        let Some(mut conn) = idle.queue.pop() else {
            trace!("idle set empty, creating connection");
            return self.create_connection();
        };

        let now = self.clock.now();
        if let Some(reason) = self.policy.check(conn.metadata(), now) {
            debug!(%reason, "retiring stale connection");
            self.metrics.record_eviction(reason);
            self.close_connection(conn);
            return self.create_connection();
        }

        conn.touch(now);
        self.metrics.total_reused.fetch_add(1, Ordering::Relaxed);
        trace!("reusing idle connection");
        Ok(conn)
    }

    /// Return a borrowed connection, or close it when `force_close` is set
    ///
    /// Passing `None` is a no-op on an open pool.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] after [`close`](Self::close); the
    /// connection is closed rather than leaked. Returns
    /// [`PoolError::PoolFull`] when the idle set is at capacity; the
    /// connection has been closed.
    pub fn release(
        &self,
        conn: impl Into<Option<PooledConnection<F::Connection>>>,
        force_close: bool,
    ) -> PoolResult<()> {
        let conn = conn.into();
        let idle = self.idle.read();
        if idle.closed {
            if let Some(conn) = conn {
                self.close_connection(conn);
            }
            return Err(PoolError::Closed);
        }

        let Some(conn) = conn else {
            return Ok(());
        };

        if force_close {
            self.metrics.force_closed.fetch_add(1, Ordering::Relaxed);
            self.close_connection(conn);
            return Ok(());
        }

        match idle.queue.push(conn) {
            Ok(()) => {
                self.metrics.total_released.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
            Err(conn) => {
                debug!(capacity = self.capacity, "pool full, closing released connection");
                self.metrics.overflow_closed.fetch_add(1, Ordering::Relaxed);
                self.close_connection(conn);
                Err(PoolError::PoolFull)
            }
        }
    }

    /// Borrow a connection that is released automatically when dropped
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire).
    pub fn checkout(&self) -> PoolResult<ConnectionGuard<'_, F>> {
        let conn = self.acquire()?;
        Ok(ConnectionGuard {
            pool: self,
            conn: Some(conn),
            discard: false,
        })
    }

    /// Number of idle connections
    pub fn len(&self) -> usize {
        self.idle.read().queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of idle connections retained
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_closed(&self) -> bool {
        self.idle.read().closed
    }

    pub fn eviction_policy(&self) -> EvictionPolicy {
        self.policy
    }

    /// Shut the pool down, closing every idle connection
    ///
    /// Waits for in-flight acquires and releases to finish.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Closed`] if the pool was already closed.
    pub fn close(&self) -> PoolResult<()> {
        let mut idle = self.idle.write();
        if idle.closed {
            return Err(PoolError::Closed);
        }
        idle.closed = true;

        let mut drained = 0usize;
        while let Some(conn) = idle.queue.pop() {
            self.close_connection(conn);
            drained += 1;
        }
        debug!(drained, "connection pool closed");
        Ok(())
    }

    /// Get pool metrics
    pub fn get_metrics(&self) -> PoolMetrics {
        self.metrics.get_metrics(self.len(), self.capacity)
    }

    /// Export metrics
    pub fn export_metrics(&self) -> HashMap<String, String> {
        self.get_metrics().export()
    }

    /// Export metrics in Prometheus format
    ///
    /// # Errors
    ///
    /// See [`MetricsExporter::export_prometheus`](crate::MetricsExporter::export_prometheus).
    #[cfg(feature = "metrics")]
    pub fn export_metrics_prometheus(
        &self,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> PoolResult<String> {
        crate::metrics::MetricsExporter::export_prometheus(&self.get_metrics(), pool_name, tags)
    }

    fn create_connection(&self) -> PoolResult<PooledConnection<F::Connection>> {
        match self.factory.create() {
            Ok(conn) => {
                self.metrics.total_created.fetch_add(1, Ordering::Relaxed);
                debug!("created connection");
                Ok(PooledConnection::new(conn, self.clock.now()))
            }
            Err(err) => {
                self.metrics.create_failures.fetch_add(1, Ordering::Relaxed);
                debug!(error = %err, "connection factory failed");
                Err(PoolError::Create(err))
            }
        }
    }

    fn close_connection(&self, conn: PooledConnection<F::Connection>) {
        if let Err(error) = conn.close() {
            warn!(%error, "failed to close connection");
        }
    }

    /// Acquire on the blocking thread pool, for factories that block on a handshake
    ///
    /// # Errors
    ///
    /// Same as [`acquire`](Self::acquire), plus [`PoolError::Cancelled`] if
    /// the blocking task was cancelled or panicked.
    pub async fn acquire_async(self: &Arc<Self>) -> PoolResult<PooledConnection<F::Connection>> {
        let pool = Arc::clone(self);
        tokio::task::spawn_blocking(move || pool.acquire())
            .await
            .map_err(|_| PoolError::Cancelled)?
    }
}

impl<F: ConnectionFactory> Drop for ConnectionPool<F> {
    fn drop(&mut self) {
        let idle = self.idle.get_mut();
        if idle.closed {
            return;
        }
        while let Some(conn) = idle.queue.pop() {
            if let Err(error) = conn.close() {
                warn!(%error, "failed to close connection");
            }
        }
    }
}

impl<F: ConnectionFactory> fmt::Debug for ConnectionPool<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let idle = self.idle.read();
        f.debug_struct("ConnectionPool")
            .field("idle", &idle.queue.len())
            .field("capacity", &self.capacity)
            .field("closed", &idle.closed)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

/// A checked-out connection that returns to the pool when dropped
pub struct ConnectionGuard<'a, F: ConnectionFactory> {
    pool: &'a ConnectionPool<F>,
    conn: Option<PooledConnection<F::Connection>>,
    discard: bool,
}

impl<F: ConnectionFactory> ConnectionGuard<'_, F> {
    /// Close the connection on drop instead of returning it
    pub fn discard(&mut self) {
        self.discard = true;
    }

    /// Detach the connection for an explicit [`ConnectionPool::release`]
    pub fn into_inner(mut self) -> PooledConnection<F::Connection> {
        self.conn.take().expect("Connection already taken")
    }
}

impl<F: ConnectionFactory> Deref for ConnectionGuard<'_, F> {
    type Target = PooledConnection<F::Connection>;

    fn deref(&self) -> &Self::Target {
        self.conn.as_ref().expect("Connection already taken")
    }
}

impl<F: ConnectionFactory> DerefMut for ConnectionGuard<'_, F> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.conn.as_mut().expect("Connection already taken")
    }
}

impl<F: ConnectionFactory> Drop for ConnectionGuard<'_, F> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take()
            && let Err(err) = self.pool.release(conn, self.discard)
        {
            debug!(error = %err, "connection not returned to pool");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Connection;
    use crate::errors::BoxError;
    use crate::eviction::ManualClock;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    #[derive(Default)]
    struct Ledger {
        next_id: AtomicUsize,
        closed: Mutex<Vec<usize>>,
        fail: AtomicBool,
    }

    struct TestConn {
        id: usize,
        ledger: Arc<Ledger>,
    }

    impl Connection for TestConn {
        fn close(self) -> Result<(), BoxError> {
            self.ledger.closed.lock().push(self.id);
            Ok(())
        }
    }

    fn factory(ledger: &Arc<Ledger>) -> impl ConnectionFactory<Connection = TestConn> + use<> {
        let ledger = Arc::clone(ledger);
        move || {
            if ledger.fail.load(Ordering::SeqCst) {
                return Err(BoxError::from("connection refused"));
            }
            let id = ledger.next_id.fetch_add(1, Ordering::SeqCst);
            Ok(TestConn {
                id,
                ledger: Arc::clone(&ledger),
            })
        }
    }

    fn config(len: usize, cap: usize) -> PoolConfiguration {
        PoolConfiguration::new().with_initial_len(len).with_capacity(cap)
    }

    #[test]
    fn test_prewarm_fills_idle_set() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(3, 5)).unwrap();
        assert_eq!(pool.len(), 3);
        assert_eq!(pool.get_metrics().total_created, 3);
    }

    #[test]
    fn test_invalid_config_creates_nothing() {
        let ledger = Arc::new(Ledger::default());
        let err = ConnectionPool::with_config(factory(&ledger), config(6, 5)).unwrap_err();
        assert!(matches!(err, PoolError::Config(_)));
        assert_eq!(ledger.next_id.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_failed_warmup_closes_created_connections() {
        let ledger = Arc::new(Ledger::default());
        let inner = factory(&ledger);
        let calls = AtomicUsize::new(0);
        let flaky = move || {
            if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                return Err(BoxError::from("handshake failed"));
            }
            inner.create()
        };

        let err = ConnectionPool::with_config(flaky, config(4, 4)).unwrap_err();
        assert!(matches!(err, PoolError::Create(_)));

        let mut closed = ledger.closed.lock().clone();
        closed.sort_unstable();
        assert_eq!(closed, vec![0, 1]);
    }

    #[test]
    fn test_acquire_reuses_idle_connection() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(1, 2)).unwrap();

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id, 0);
        pool.release(conn, false).unwrap();

        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id, 0);
        assert!(conn.created_at() <= conn.last_used_at());
        assert_eq!(pool.get_metrics().total_reused, 2);
    }

    #[test]
    fn test_acquire_beyond_capacity_creates_connections() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(0, 1)).unwrap();

        let held: Vec<_> = (0..4).map(|_| pool.acquire().unwrap()).collect();
        assert_eq!(held.len(), 4);
        assert_eq!(ledger.next_id.load(Ordering::SeqCst), 4);

        let results: Vec<_> = held.into_iter().map(|c| pool.release(c, false)).collect();
        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        assert_eq!(
            results
                .iter()
                .filter(|r| matches!(r, Err(PoolError::PoolFull)))
                .count(),
            3
        );
        assert_eq!(pool.len(), 1);
        assert_eq!(ledger.closed.lock().len(), 3);
    }

    #[test]
    fn test_factory_failure_is_create_error() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(0, 2)).unwrap();
        ledger.fail.store(true, Ordering::SeqCst);

        assert!(matches!(pool.acquire(), Err(PoolError::Create(_))));
        assert_eq!(pool.get_metrics().create_failures, 1);

        ledger.fail.store(false, Ordering::SeqCst);
        assert!(pool.acquire().is_ok());
    }

    #[test]
    fn test_idle_timeout_evicts_on_acquire() {
        let ledger = Arc::new(Ledger::default());
        let clock = ManualClock::new();
        let config = config(1, 2).with_idle_timeout(Duration::from_secs(1));
        let pool =
            ConnectionPool::with_clock(factory(&ledger), config, Arc::new(clock.clone())).unwrap();

        clock.advance(Duration::from_millis(1100));
        let conn = pool.acquire().unwrap();

        assert_eq!(conn.id, 1);
        assert_eq!(*ledger.closed.lock(), vec![0]);
        assert_eq!(pool.get_metrics().evicted_idle, 1);
    }

    #[test]
    fn test_lifetime_evicts_recently_used_connection() {
        let ledger = Arc::new(Ledger::default());
        let clock = ManualClock::new();
        let config = config(1, 2).with_lifetime(Duration::from_secs(10));
        let pool =
            ConnectionPool::with_clock(factory(&ledger), config, Arc::new(clock.clone())).unwrap();

        clock.advance(Duration::from_secs(9));
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id, 0);
        pool.release(conn, false).unwrap();

        clock.advance(Duration::from_secs(1));
        let conn = pool.acquire().unwrap();
        assert_eq!(conn.id, 1);
        assert_eq!(pool.get_metrics().evicted_lifetime, 1);
    }

    #[test]
    fn test_force_close_never_grows_idle_set() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(0, 2)).unwrap();

        let conn = pool.acquire().unwrap();
        pool.release(conn, true).unwrap();

        assert_eq!(pool.len(), 0);
        assert_eq!(*ledger.closed.lock(), vec![0]);
    }

    #[test]
    fn test_release_none_is_noop() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(1, 2)).unwrap();
        assert!(pool.release(None, false).is_ok());
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_close_drains_and_rejects() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(2, 3)).unwrap();
        let borrowed = pool.acquire().unwrap();

        pool.close().unwrap();
        assert!(pool.is_closed());
        assert_eq!(pool.len(), 0);
        assert_eq!(*ledger.closed.lock(), vec![1]);

        assert!(matches!(pool.acquire(), Err(PoolError::Closed)));
        assert!(matches!(pool.release(borrowed, false), Err(PoolError::Closed)));
        assert!(matches!(pool.release(None, false), Err(PoolError::Closed)));
        assert!(matches!(pool.close(), Err(PoolError::Closed)));

        let mut closed = ledger.closed.lock().clone();
        closed.sort_unstable();
        assert_eq!(closed, vec![0, 1]);
    }

    #[test]
    fn test_drop_closes_idle_connections() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(2, 2)).unwrap();
        drop(pool);
        assert_eq!(ledger.closed.lock().len(), 2);
    }

    #[test]
    fn test_guard_returns_on_drop() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(1, 1)).unwrap();

        {
            let guard = pool.checkout().unwrap();
            assert_eq!(guard.id, 0);
            assert_eq!(pool.len(), 0);
        }
        assert_eq!(pool.len(), 1);

        {
            let mut guard = pool.checkout().unwrap();
            guard.discard();
        }
        assert_eq!(pool.len(), 0);
        assert_eq!(*ledger.closed.lock(), vec![0]);
    }

    #[test]
    fn test_guard_into_inner_detaches() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(1, 1)).unwrap();

        let conn = pool.checkout().unwrap().into_inner();
        assert_eq!(pool.len(), 0);
        pool.release(conn, false).unwrap();
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn test_concurrent_acquire_release() {
        let ledger = Arc::new(Ledger::default());
        let pool = ConnectionPool::with_config(factory(&ledger), config(4, 4)).unwrap();

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..200 {
                        let conn = pool.acquire().unwrap();
                        let _ = pool.release(conn, false);
                    }
                });
            }
        });

        let created = ledger.next_id.load(Ordering::SeqCst);
        let closed = ledger.closed.lock().len();
        assert!(pool.len() <= pool.capacity());
        assert_eq!(created - closed, pool.len());
    }

    #[tokio::test]
    async fn test_acquire_async() {
        let ledger = Arc::new(Ledger::default());
        let pool = Arc::new(ConnectionPool::with_config(factory(&ledger), config(1, 2)).unwrap());

        let conn = pool.acquire_async().await.unwrap();
        assert_eq!(conn.id, 0);
        pool.release(conn, false).unwrap();
        assert_eq!(pool.len(), 1);
    }
}
