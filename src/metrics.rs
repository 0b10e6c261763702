//! Metrics collection and export for connection pools

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::eviction::EvictionReason;

/// Point-in-time metrics for a pool
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ConnectionPool};
/// use std::time::Duration;
///
/// struct Conn;
/// impl Connection for Conn {
///     fn close(self) -> Result<(), BoxError> { Ok(()) }
/// }
///
/// let pool = ConnectionPool::new(|| Ok::<_, BoxError>(Conn), 1, 4, Duration::ZERO, Duration::ZERO).unwrap();
/// let conn = pool.acquire().unwrap();
/// pool.release(conn, false).unwrap();
///
/// let metrics = pool.get_metrics();
/// assert_eq!(metrics.total_created, 1);
/// assert_eq!(metrics.total_reused, 1);
/// assert_eq!(metrics.idle_connections, 1);
/// ```
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize))]
pub struct PoolMetrics {
    /// Connections produced by the factory
    pub total_created: usize,

    /// Acquires served from the idle set
    pub total_reused: usize,

    /// Connections returned to the idle set
    pub total_released: usize,

    /// Connections retired for sitting idle too long
    pub evicted_idle: usize,

    /// Connections retired for exceeding their lifetime
    pub evicted_lifetime: usize,

    /// Connections closed on request at release
    pub force_closed: usize,

    /// Connections closed because the idle set was full
    pub overflow_closed: usize,

    /// Factory invocations that failed
    pub create_failures: usize,

    /// Current idle connections
    pub idle_connections: usize,

    /// Idle-set fill ratio (0.0 to 1.0)
    pub utilization: f64,

    /// Maximum idle connections
    pub capacity: usize,
}

impl PoolMetrics {
    /// Export metrics as a HashMap
    pub fn export(&self) -> HashMap<String, String> {
        let mut metrics = HashMap::new();
        metrics.insert("total_created".to_string(), self.total_created.to_string());
        metrics.insert("total_reused".to_string(), self.total_reused.to_string());
        metrics.insert("total_released".to_string(), self.total_released.to_string());
        metrics.insert("evicted_idle".to_string(), self.evicted_idle.to_string());
        metrics.insert("evicted_lifetime".to_string(), self.evicted_lifetime.to_string());
        metrics.insert("force_closed".to_string(), self.force_closed.to_string());
        metrics.insert("overflow_closed".to_string(), self.overflow_closed.to_string());
        metrics.insert("create_failures".to_string(), self.create_failures.to_string());
        metrics.insert("idle_connections".to_string(), self.idle_connections.to_string());
        metrics.insert("utilization".to_string(), format!("{:.2}", self.utilization));
        metrics.insert("capacity".to_string(), self.capacity.to_string());
        metrics
    }
}

/// Metrics exporter for Prometheus format
#[cfg(feature = "metrics")]
pub struct MetricsExporter;

#[cfg(feature = "metrics")]
impl MetricsExporter {
    /// Export metrics in Prometheus exposition format
    ///
    /// Every series carries a `pool` label plus any extra `tags`.
    ///
    /// # Errors
    ///
    /// Returns [`PoolError::Metrics`](crate::PoolError::Metrics) if a label
    /// or metric name is rejected by the registry.
    pub fn export_prometheus(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> crate::PoolResult<String> {
        Self::encode(metrics, pool_name, tags)
            .map_err(|e| crate::PoolError::Metrics(e.to_string()))
    }

    fn encode(
        metrics: &PoolMetrics,
        pool_name: &str,
        tags: Option<&HashMap<String, String>>,
    ) -> prometheus::Result<String> {
        use prometheus::{Encoder, Gauge, IntCounter, IntGauge, Registry, TextEncoder};

        let mut labels = tags.cloned().unwrap_or_default();
        labels.insert("pool".to_string(), pool_name.to_string());
        let registry = Registry::new_custom(Some("connpool".to_string()), Some(labels))?;

        let idle = IntGauge::new("connections_idle", "Current idle connections")?;
        idle.set(metrics.idle_connections as i64);
        registry.register(Box::new(idle))?;

        let capacity = IntGauge::new("capacity", "Maximum idle connections")?;
        capacity.set(metrics.capacity as i64);
        registry.register(Box::new(capacity))?;

        let utilization = Gauge::new("utilization", "Idle-set fill ratio")?;
        utilization.set(metrics.utilization);
        registry.register(Box::new(utilization))?;

        let counters = [
            ("connections_created_total", "Connections produced by the factory", metrics.total_created),
            ("connections_reused_total", "Acquires served from the idle set", metrics.total_reused),
            ("connections_released_total", "Connections returned to the idle set", metrics.total_released),
            ("evicted_idle_total", "Connections retired by idle timeout", metrics.evicted_idle),
            ("evicted_lifetime_total", "Connections retired by lifetime", metrics.evicted_lifetime),
            ("force_closed_total", "Connections closed on release by request", metrics.force_closed),
            ("overflow_closed_total", "Connections closed because the pool was full", metrics.overflow_closed),
            ("create_failures_total", "Failed factory invocations", metrics.create_failures),
        ];
        for (name, help, value) in counters {
            let counter = IntCounter::new(name, help)?;
            counter.inc_by(value as u64);
            registry.register(Box::new(counter))?;
        }

        let mut buffer = Vec::new();
        TextEncoder::new().encode(&registry.gather(), &mut buffer)?;
        String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
    }
}

/// Internal metrics tracker
#[derive(Debug, Default)]
pub(crate) struct MetricsTracker {
    pub total_created: AtomicUsize,
    pub total_reused: AtomicUsize,
    pub total_released: AtomicUsize,
    pub evicted_idle: AtomicUsize,
    pub evicted_lifetime: AtomicUsize,
    pub force_closed: AtomicUsize,
    pub overflow_closed: AtomicUsize,
    pub create_failures: AtomicUsize,
}

impl MetricsTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_eviction(&self, reason: EvictionReason) {
        let counter = match reason {
            EvictionReason::IdleTimeout => &self.evicted_idle,
            EvictionReason::Lifetime => &self.evicted_lifetime,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_metrics(&self, idle: usize, capacity: usize) -> PoolMetrics {
        let utilization = if capacity > 0 {
            idle as f64 / capacity as f64
        } else {
            0.0
        };

        PoolMetrics {
            total_created: self.total_created.load(Ordering::Relaxed),
            total_reused: self.total_reused.load(Ordering::Relaxed),
            total_released: self.total_released.load(Ordering::Relaxed),
            evicted_idle: self.evicted_idle.load(Ordering::Relaxed),
            evicted_lifetime: self.evicted_lifetime.load(Ordering::Relaxed),
            force_closed: self.force_closed.load(Ordering::Relaxed),
            overflow_closed: self.overflow_closed.load(Ordering::Relaxed),
            create_failures: self.create_failures.load(Ordering::Relaxed),
            idle_connections: idle,
            utilization,
            capacity,
        }
    }
}
