//! # Esox ConnPool
//!
//! Bounded, thread-safe pool of client connections for callers that issue
//! many short remote calls over long-lived transport connections.
//!
//! ## Features
//!
//! - Non-blocking acquire and release over a lock-free bounded idle queue
//! - Create-on-miss: an empty idle set never makes a caller wait
//! - Close-on-overflow: at most `capacity` idle connections are retained
//! - Lazy idle-timeout and lifetime eviction, checked at acquire time
//! - Injectable clock for deterministic eviction
//! - Idempotent shutdown that closes every idle connection
//! - Automatic return of connections via RAII guards
//! - Async acquire for factories that block on a handshake
//! - Metrics and Prometheus export
//!
//! ## Quick Start
//!
//! ```rust
//! use esox_connpool::{BoxError, Connection, ConnectionPool};
//! use std::time::Duration;
//!
//! struct Channel;
//!
//! impl Connection for Channel {
//!     fn close(self) -> Result<(), BoxError> {
//!         Ok(())
//!     }
//! }
//!
//! let pool = ConnectionPool::new(
//!     || Ok::<_, BoxError>(Channel),
//!     1,
//!     8,
//!     Duration::from_secs(30),
//!     Duration::from_secs(600),
//! )
//! .unwrap();
//!
//! {
//!     let _conn = pool.checkout().unwrap();
//!     // Connection automatically returned when `_conn` goes out of scope
//! }
//! assert_eq!(pool.len(), 1);
//! ```

mod pool;
mod config;
mod connection;
mod metrics;
mod eviction;
mod errors;

pub use pool::{ConnectionPool, ConnectionGuard};
pub use config::PoolConfiguration;
pub use connection::{Connection, ConnectionFactory, PooledConnection};
pub use metrics::PoolMetrics;
#[cfg(feature = "metrics")]
pub use metrics::MetricsExporter;
pub use eviction::{Clock, ConnectionMetadata, EvictionPolicy, EvictionReason, ManualClock, SystemClock};
pub use errors::{BoxError, PoolError, PoolResult};
