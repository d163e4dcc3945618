//! Idle HTTP/1.1 connection pool keyed by `(host, port)`.
//!
//! Connections leave the pool inside a [`Checkout`] guard. Dropping the guard
//! on any path (success, error, cancellation) hands the connection back, and
//! the pool keeps it only if the last exchange left it reusable.

use std::collections::HashMap;
use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crate::transport::h1::Connection;

/// Default idle lifetime of a pooled connection.
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// Default number of idle connections kept per host.
pub const DEFAULT_MAX_IDLE_PER_HOST: usize = 6;

/// What the pool needs from a connection.
pub trait Poolable {
    /// The last exchange finished cleanly and the server allows reuse.
    fn is_reusable(&self) -> bool;
    fn idle_for(&self) -> Duration;
    /// Restart the idle clock.
    fn touch(&mut self);
}

impl Poolable for Connection {
    fn is_reusable(&self) -> bool {
        Connection::is_reusable(self)
    }

    fn idle_for(&self) -> Duration {
        Connection::idle_for(self)
    }

    fn touch(&mut self) {
        Connection::touch(self)
    }
}

/// Pool key: connections are only shared between identical hosts and ports.
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct PoolKey {
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// Pool statistics for monitoring
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PoolStats {
    pub hosts: usize,
    pub idle_connections: usize,
}

/// Idle connection pool.
pub struct ConnectionPool<C = Connection> {
    idle: Mutex<HashMap<PoolKey, Vec<C>>>,
    idle_timeout: Duration,
    max_idle_per_host: usize,
}

impl<C: Poolable> ConnectionPool<C> {
    pub fn new() -> Self {
        Self::with_config(DEFAULT_IDLE_TIMEOUT, DEFAULT_MAX_IDLE_PER_HOST)
    }

    pub fn with_config(idle_timeout: Duration, max_idle_per_host: usize) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            idle_timeout,
            max_idle_per_host,
        }
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PoolKey, Vec<C>>> {
        // a panic while holding the lock cannot leave the map inconsistent
        self.idle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Most recently returned live connection for `key`, discarding expired ones.
    pub fn take(&self, key: &PoolKey) -> Option<C> {
        let start = Instant::now();
        let mut pool = self.lock();
        let entries = match pool.get_mut(key) {
            Some(entries) => entries,
            None => {
                tracing::debug!("H1 Pool: No entries for key {:?}", key);
                return None;
            }
        };

        let initial_count = entries.len();
        while let Some(conn) = entries.pop() {
            if conn.idle_for() < self.idle_timeout {
                tracing::debug!(
                    "H1 Pool: Reusing connection for {:?} (checked {} entries, took {:?})",
                    key,
                    initial_count - entries.len(),
                    start.elapsed()
                );
                if entries.is_empty() {
                    pool.remove(key);
                }
                return Some(conn);
            }
            tracing::debug!(
                "H1 Pool: Connection expired for {:?} (idle: {:?})",
                key,
                conn.idle_for()
            );
        }
        pool.remove(key);
        None
    }

    /// Return a connection. Returns `false` (and drops it) when it is not
    /// reusable or the per-host cap is reached.
    pub fn put(&self, key: PoolKey, mut conn: C) -> bool {
        if !conn.is_reusable() {
            tracing::debug!("H1 Pool: Discarding non-reusable connection for {:?}", key);
            return false;
        }
        if self.max_idle_per_host == 0 {
            return false;
        }

        let mut pool = self.lock();
        let entries = pool.entry(key).or_default();
        entries.retain(|c| c.idle_for() < self.idle_timeout);
        if entries.len() >= self.max_idle_per_host {
            tracing::debug!(
                "H1 Pool: Per-host cap of {} reached, closing connection",
                self.max_idle_per_host
            );
            return false;
        }
        conn.touch();
        entries.push(conn);
        tracing::debug!("H1 Pool: Returned connection (pool size: {})", entries.len());
        true
    }

    /// Wrap `conn` in a guard that returns it to this pool when dropped.
    pub fn checkout(&self, key: PoolKey, conn: C, reused: bool) -> Checkout<'_, C> {
        Checkout {
            pool: self,
            key,
            conn: Some(conn),
            reused,
        }
    }

    /// Idle connections currently held for `key`.
    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.lock().get(key).map_or(0, Vec::len)
    }

    /// Remove expired connections.
    pub fn purge_expired(&self) {
        let mut pool = self.lock();
        for entries in pool.values_mut() {
            entries.retain(|c| c.idle_for() < self.idle_timeout);
        }
        pool.retain(|_, entries| !entries.is_empty());
    }

    /// Close every idle connection.
    pub fn clear(&self) {
        let mut pool = self.lock();
        let closed: usize = pool.values().map(Vec::len).sum();
        pool.clear();
        tracing::debug!("H1 Pool: Closed {} idle connections", closed);
    }

    pub fn stats(&self) -> PoolStats {
        let pool = self.lock();
        PoolStats {
            hosts: pool.len(),
            idle_connections: pool.values().map(Vec::len).sum(),
        }
    }
}

impl<C: Poolable> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection on loan from the pool.
///
/// Derefs to the connection. On drop it goes back through
/// [`ConnectionPool::put`], which discards it unless reusable.
pub struct Checkout<'p, C: Poolable = Connection> {
    pool: &'p ConnectionPool<C>,
    key: PoolKey,
    conn: Option<C>,
    reused: bool,
}

impl<C: Poolable> Checkout<'_, C> {
    /// Whether the connection came out of the pool rather than a fresh connect.
    pub fn reused(&self) -> bool {
        self.reused
    }

    pub fn key(&self) -> &PoolKey {
        &self.key
    }
}

impl<C: Poolable> Deref for Checkout<'_, C> {
    type Target = C;

    fn deref(&self) -> &C {
        // only `Drop` takes the connection out
        self.conn.as_ref().expect("checkout holds a connection until dropped")
    }
}

impl<C: Poolable> DerefMut for Checkout<'_, C> {
    fn deref_mut(&mut self) -> &mut C {
        self.conn.as_mut().expect("checkout holds a connection until dropped")
    }
}

impl<C: Poolable> Drop for Checkout<'_, C> {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.pool.put(self.key.clone(), conn);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FakeConn {
        id: u32,
        reusable: bool,
        last_used: Instant,
    }

    impl FakeConn {
        fn new(id: u32) -> Self {
            Self {
                id,
                reusable: true,
                last_used: Instant::now(),
            }
        }
    }

    impl Poolable for FakeConn {
        fn is_reusable(&self) -> bool {
            self.reusable
        }

        fn idle_for(&self) -> Duration {
            self.last_used.elapsed()
        }

        fn touch(&mut self) {
            self.last_used = Instant::now();
        }
    }

    fn key() -> PoolKey {
        PoolKey::new("api.example.com", 443)
    }

    #[test]
    fn test_pool_key_equality() {
        assert_eq!(PoolKey::new("a.com", 443), PoolKey::new("a.com", 443));
        assert_ne!(PoolKey::new("a.com", 443), PoolKey::new("a.com", 8443));
        assert_ne!(PoolKey::new("a.com", 443), PoolKey::new("b.com", 443));
    }

    #[test]
    fn test_take_returns_most_recent() {
        let pool = ConnectionPool::<FakeConn>::new();
        assert!(pool.put(key(), FakeConn::new(1)));
        assert!(pool.put(key(), FakeConn::new(2)));
        assert_eq!(pool.idle_count(&key()), 2);

        assert_eq!(pool.take(&key()).unwrap().id, 2);
        assert_eq!(pool.take(&key()).unwrap().id, 1);
        assert!(pool.take(&key()).is_none());
        assert_eq!(pool.stats(), PoolStats::default());
    }

    #[test]
    fn test_keys_are_isolated() {
        let pool = ConnectionPool::<FakeConn>::new();
        pool.put(key(), FakeConn::new(1));
        assert!(pool.take(&PoolKey::new("api.example.com", 8443)).is_none());
        assert!(pool.take(&PoolKey::new("other.example.com", 443)).is_none());
        assert_eq!(pool.idle_count(&key()), 1);
    }

    #[test]
    fn test_non_reusable_is_discarded() {
        let pool = ConnectionPool::<FakeConn>::new();
        let mut conn = FakeConn::new(1);
        conn.reusable = false;
        assert!(!pool.put(key(), conn));
        assert_eq!(pool.idle_count(&key()), 0);
    }

    #[test]
    fn test_per_host_cap() {
        let pool = ConnectionPool::<FakeConn>::with_config(DEFAULT_IDLE_TIMEOUT, 2);
        assert!(pool.put(key(), FakeConn::new(1)));
        assert!(pool.put(key(), FakeConn::new(2)));
        assert!(!pool.put(key(), FakeConn::new(3)));
        assert_eq!(pool.idle_count(&key()), 2);
    }

    #[test]
    fn test_expired_connections_not_returned() {
        let pool = ConnectionPool::<FakeConn>::with_config(Duration::from_millis(20), 6);
        pool.put(key(), FakeConn::new(1));
        std::thread::sleep(Duration::from_millis(40));
        assert!(pool.take(&key()).is_none());

        pool.put(key(), FakeConn::new(2));
        std::thread::sleep(Duration::from_millis(40));
        pool.purge_expired();
        assert_eq!(pool.stats().idle_connections, 0);
    }

    #[test]
    fn test_checkout_returns_on_drop() {
        let pool = ConnectionPool::<FakeConn>::new();
        {
            let conn = pool.checkout(key(), FakeConn::new(7), false);
            assert!(!conn.reused());
            assert_eq!(conn.id, 7);
        }
        assert_eq!(pool.idle_count(&key()), 1);
    }

    #[test]
    fn test_checkout_discards_when_not_reusable() {
        let pool = ConnectionPool::<FakeConn>::new();
        {
            let mut conn = pool.checkout(key(), FakeConn::new(7), true);
            conn.reusable = false;
        }
        assert_eq!(pool.idle_count(&key()), 0);
    }

    #[test]
    fn test_clear() {
        let pool = ConnectionPool::<FakeConn>::new();
        pool.put(key(), FakeConn::new(1));
        pool.put(PoolKey::new("b.example.com", 443), FakeConn::new(2));
        assert_eq!(pool.stats(), PoolStats { hosts: 2, idle_connections: 2 });
        pool.clear();
        assert_eq!(pool.stats().idle_connections, 0);
    }
}
