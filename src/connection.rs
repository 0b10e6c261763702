//! Connection and factory collaborators, and the pooled connection record

use std::fmt;
use std::ops::{Deref, DerefMut};
use std::time::Instant;

use crate::errors::BoxError;
use crate::eviction::ConnectionMetadata;

/// A transport connection the pool can retire
pub trait Connection: Send + 'static {
    /// Close the connection, releasing its transport resources
    fn close(self) -> Result<(), BoxError>;
}

/// Capability that manufactures one ready-to-use connection, or fails
///
/// Implemented for any `Fn() -> Result<C, E>` closure.
///
/// # Examples
///
/// ```
/// use esox_connpool::{BoxError, Connection, ConnectionFactory};
///
/// struct Channel(u16);
///
/// impl Connection for Channel {
///     fn close(self) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// let factory = || Ok::<_, std::io::Error>(Channel(50051));
/// assert_eq!(factory.create().unwrap().0, 50051);
/// ```
pub trait ConnectionFactory: Send + Sync + 'static {
    type Connection: Connection;

    fn create(&self) -> Result<Self::Connection, BoxError>;
}

impl<F, C, E> ConnectionFactory for F
where
    F: Fn() -> Result<C, E> + Send + Sync + 'static,
    C: Connection,
    E: Into<BoxError>,
{
    type Connection = C;

    fn create(&self) -> Result<C, BoxError> {
        (self)().map_err(Into::into)
    }
}

/// A connection together with its creation and last-use timestamps
///
/// Owned either by the pool's idle set or by the caller that acquired it,
/// never both.
pub struct PooledConnection<C> {
    conn: C,
    meta: ConnectionMetadata,
}

impl<C: Connection> PooledConnection<C> {
    pub(crate) fn new(conn: C, now: Instant) -> Self {
        Self {
            conn,
            meta: ConnectionMetadata::new(now),
        }
    }

    pub(crate) fn metadata(&self) -> &ConnectionMetadata {
        &self.meta
    }

    pub(crate) fn touch(&mut self, now: Instant) {
        self.meta.touch(now);
    }

    pub(crate) fn close(self) -> Result<(), BoxError> {
        self.conn.close()
    }

    /// When the factory produced this connection
    pub fn created_at(&self) -> Instant {
        self.meta.created_at()
    }

    /// When this connection was last handed out
    pub fn last_used_at(&self) -> Instant {
        self.meta.last_used_at()
    }

    pub fn get_ref(&self) -> &C {
        &self.conn
    }

    pub fn get_mut(&mut self) -> &mut C {
        &mut self.conn
    }

    /// Take the raw connection out of the pool's bookkeeping for good
    pub fn into_inner(self) -> C {
        self.conn
    }
}

impl<C> Deref for PooledConnection<C> {
    type Target = C;

    fn deref(&self) -> &Self::Target {
        &self.conn
    }
}

impl<C> DerefMut for PooledConnection<C> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.conn
    }
}

impl<C> fmt::Debug for PooledConnection<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PooledConnection")
            .field("created_at", &self.meta.created_at())
            .field("last_used_at", &self.meta.last_used_at())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    struct Dummy(u8);

    impl Connection for Dummy {
        fn close(self) -> Result<(), BoxError> {
            Ok(())
        }
    }

    #[test]
    fn test_closure_factory_maps_error() {
        let factory = || Err::<Dummy, _>(io::Error::new(io::ErrorKind::ConnectionRefused, "refused"));
        let err = factory.create().err().unwrap();
        assert_eq!(err.to_string(), "refused");
    }

    #[test]
    fn test_pooled_connection_deref() {
        let mut pooled = PooledConnection::new(Dummy(7), Instant::now());
        assert_eq!(pooled.0, 7);
        pooled.0 = 9;
        assert_eq!(pooled.get_ref().0, 9);
        assert_eq!(pooled.created_at(), pooled.last_used_at());
        assert_eq!(pooled.into_inner().0, 9);
    }
}
