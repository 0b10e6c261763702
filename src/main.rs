// Esox ConnPool
// Bounded, thread-safe client connection pool

// This is just a binary wrapper - the actual library is in lib.rs
// Run demos with: cargo run --example basic

use esox_connpool::{BoxError, Connection, ConnectionPool};
use std::time::Duration;

struct DemoChannel(usize);

impl Connection for DemoChannel {
    fn close(self) -> Result<(), BoxError> {
        println!("  Closed channel #{}", self.0);
        Ok(())
    }
}

fn main() -> Result<(), BoxError> {
    println!("=== Esox ConnPool ===");
    println!("See demos/ directory for usage examples");
    println!("Run: cargo run --example basic");
    println!();

    println!("Quick Demo:");
    let next = std::sync::atomic::AtomicUsize::new(0);
    let factory = move || {
        Ok::<_, BoxError>(DemoChannel(
            next.fetch_add(1, std::sync::atomic::Ordering::Relaxed),
        ))
    };
    let pool = ConnectionPool::new(factory, 2, 4, Duration::ZERO, Duration::ZERO)?;

    {
        let conn = pool.checkout()?;
        println!("  Got channel #{}", conn.0);
    }

    println!("  Idle after return: {}", pool.len());
    pool.close()?;
    Ok(())
}
