//! Basic usage examples for ConnectionPool

use esox_connpool::{BoxError, Connection, ConnectionPool, PoolConfiguration, PoolError};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

/// Stand-in for an RPC channel
struct RpcChannel {
    id: usize,
}

impl Connection for RpcChannel {
    fn close(self) -> Result<(), BoxError> {
        println!("   (channel #{} closed)", self.id);
        Ok(())
    }
}

fn channel_factory() -> impl Fn() -> Result<RpcChannel, BoxError> + Send + Sync + 'static {
    let next = Arc::new(AtomicUsize::new(0));
    move || {
        Ok(RpcChannel {
            id: next.fetch_add(1, Ordering::Relaxed),
        })
    }
}

fn main() -> Result<(), BoxError> {
    println!("=== Esox ConnPool - Basic Examples ===\n");

    // Example 1: Explicit acquire and release
    explicit_release()?;

    // Example 2: Pool from configuration
    configured_pool()?;

    // Example 3: Overflow and forced close
    overflow_and_force_close()?;

    // Example 4: Idle timeout
    idle_timeout()?;

    Ok(())
}

fn explicit_release() -> Result<(), BoxError> {
    println!("1. Explicit Acquire/Release:");
    let pool = ConnectionPool::new(channel_factory(), 2, 5, Duration::ZERO, Duration::ZERO)?;

    let c1 = pool.acquire()?;
    let c2 = pool.acquire()?;
    println!("   Acquired #{} and #{}, idle: {}", c1.id, c2.id, pool.len());

    pool.release(c1, false)?;
    println!("   Released one, idle: {}", pool.len());

    pool.close()?;
    match pool.acquire() {
        Err(PoolError::Closed) => println!("   Acquire after close: rejected"),
        other => println!("   Unexpected: {:?}", other.map(|c| c.id)),
    }
    if let Err(PoolError::Closed) = pool.release(c2, false) {
        println!("   Late release closed the channel instead\n");
    }
    Ok(())
}

fn configured_pool() -> Result<(), BoxError> {
    println!("2. Configured Pool:");

    let config = PoolConfiguration::new()
        .with_capacity(4)
        .with_initial_len(2)
        .with_lifetime(Duration::from_secs(600));

    let pool = ConnectionPool::with_config(channel_factory(), config)?;

    thread::scope(|s| {
        for worker in 0..3 {
            let pool = &pool;
            s.spawn(move || {
                if let Ok(conn) = pool.checkout() {
                    println!("   Worker {} using channel #{}", worker, conn.id);
                }
            });
        }
    });

    println!("   Idle after workers: {}\n", pool.len());
    Ok(())
}

fn overflow_and_force_close() -> Result<(), BoxError> {
    println!("3. Overflow and Forced Close:");
    let pool = ConnectionPool::new(channel_factory(), 0, 1, Duration::ZERO, Duration::ZERO)?;

    let a = pool.acquire()?;
    let b = pool.acquire()?;
    let c = pool.acquire()?;

    pool.release(a, false)?;
    if let Err(PoolError::PoolFull) = pool.release(b, false) {
        println!("   Second release overflowed capacity");
    }
    pool.release(c, true)?;
    println!("   Idle: {}\n", pool.len());
    Ok(())
}

fn idle_timeout() -> Result<(), BoxError> {
    println!("4. Idle Timeout:");
    let pool = ConnectionPool::new(
        channel_factory(),
        0,
        2,
        Duration::from_millis(100),
        Duration::ZERO,
    )?;

    let conn = pool.acquire()?;
    let first = conn.id;
    pool.release(conn, false)?;

    thread::sleep(Duration::from_millis(150));
    let conn = pool.acquire()?;
    println!("   Released #{}, got #{} after idling", first, conn.id);

    let metrics = pool.export_metrics();
    println!("\n   Metrics:");
    for (key, value) in metrics {
        println!("     {}: {}", key, value);
    }
    Ok(())
}
