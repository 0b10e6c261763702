//! Async usage examples

use esox_connpool::{BoxError, Connection, ConnectionFactory, ConnectionPool, PoolConfiguration};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Channel whose handshake blocks the calling thread
struct SlowChannel {
    id: u64,
}

impl Connection for SlowChannel {
    fn close(self) -> Result<(), BoxError> {
        Ok(())
    }
}

static NEXT_ID: AtomicU64 = AtomicU64::new(0);

fn slow_factory() -> Result<SlowChannel, BoxError> {
    std::thread::sleep(Duration::from_millis(20));
    Ok(SlowChannel {
        id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
    })
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    println!("=== Esox ConnPool - Async Examples ===\n");

    let config = PoolConfiguration::new()
        .with_capacity(4)
        .with_initial_len(1)
        .with_idle_timeout(Duration::from_secs(30));
    let pool = Arc::new(ConnectionPool::with_config(slow_factory, config)?);

    // Example 1: Async acquire
    async_acquire(&pool).await?;

    // Example 2: Concurrent access
    concurrent_access(&pool).await?;

    pool.close()?;
    Ok(())
}

async fn async_acquire<F>(pool: &Arc<ConnectionPool<F>>) -> Result<(), BoxError>
where
    F: ConnectionFactory<Connection = SlowChannel>,
{
    println!("1. Async Acquire:");
    let conn = pool.acquire_async().await?;
    println!("   Got channel {} without blocking the runtime", conn.id);
    pool.release(conn, false)?;
    println!();
    Ok(())
}

async fn concurrent_access<F>(pool: &Arc<ConnectionPool<F>>) -> Result<(), BoxError>
where
    F: ConnectionFactory<Connection = SlowChannel>,
{
    println!("2. Concurrent Access:");

    let mut handles = vec![];
    for task in 0..6 {
        let pool = Arc::clone(pool);
        handles.push(tokio::spawn(async move {
            let conn = pool.acquire_async().await?;
            tokio::time::sleep(Duration::from_millis(10)).await;
            println!("   Task {} used channel {}", task, conn.id);
            pool.release(conn, false)
        }));
    }

    for handle in handles {
        if let Err(err) = handle.await? {
            println!("   Release: {}", err);
        }
    }

    println!("   Idle after tasks: {}", pool.len());
    println!("   Metrics: {:?}\n", pool.get_metrics());
    Ok(())
}
