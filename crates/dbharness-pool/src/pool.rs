//! Bounded async connection pool

use std::ops::Deref;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use dbharness_core::{Connection, HarnessError, Result};
use parking_lot::Mutex;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};

use super::config::PoolConfig;
use super::stats::PoolStats;

/// Opens fresh connections on the pool's behalf.
#[async_trait]
pub trait ConnectionFactory: Send + Sync + 'static {
    async fn create(&self) -> Result<Arc<dyn Connection>>;

    /// Whether a parked connection is still worth handing out.
    async fn validate(&self, conn: &dyn Connection) -> bool {
        !conn.is_closed()
    }
}

#[async_trait]
impl<T: ConnectionFactory> ConnectionFactory for Arc<T> {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        (**self).create().await
    }

    async fn validate(&self, conn: &dyn Connection) -> bool {
        (**self).validate(conn).await
    }
}

/// A parked connection, remembering when it was opened and parked so the
/// lifetime and idle limits can be enforced on checkout.
struct Parked {
    conn: Arc<dyn Connection>,
    opened: Instant,
    parked: Instant,
}

/// State shared between the pool handle and every checked-out connection.
struct PoolCore {
    config: PoolConfig,
    factory: Box<dyn ConnectionFactory>,
    /// Stack of parked connections; the most recently parked one is
    /// handed out first so cold connections age out instead of cycling.
    idle: Mutex<Vec<Parked>>,
    /// One permit per allowed connection, shared with checkout guards
    permits: Arc<Semaphore>,
    borrowed: AtomicUsize,
    waiting: AtomicUsize,
}

impl PoolCore {
    /// Called from the checkout guard's `Drop`.
    fn park(&self, conn: Arc<dyn Connection>, opened: Instant) {
        self.borrowed.fetch_sub(1, Ordering::SeqCst);
        if conn.is_closed() {
            return;
        }
        self.idle.lock().push(Parked {
            conn,
            opened,
            parked: Instant::now(),
        });
    }
}

/// Decrements a counter when dropped, however the scope exits.
struct CountGuard<'a>(&'a AtomicUsize);

impl<'a> CountGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for CountGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

/// Shareable pool of database connections.
///
/// Checkout order is get -> use -> drop; dropping the returned
/// [`PooledConnection`] parks the connection for the next caller. The
/// pool never exceeds its configured `max_size`, and callers beyond that
/// limit wait (up to the acquire timeout) for a connection to come back.
pub struct ConnectionPool {
    core: Arc<PoolCore>,
}

impl ConnectionPool {
    pub fn new<F: ConnectionFactory>(config: PoolConfig, factory: F) -> Self {
        let permits = Arc::new(Semaphore::new(config.max_size()));
        tracing::debug!(
            pool = %config.name(),
            max_size = config.max_size(),
            "connection pool created"
        );
        Self {
            core: Arc::new(PoolCore {
                config,
                factory: Box::new(factory),
                idle: Mutex::new(Vec::new()),
                permits,
                borrowed: AtomicUsize::new(0),
                waiting: AtomicUsize::new(0),
            }),
        }
    }

    /// Borrow a connection, reusing a parked one when possible.
    ///
    /// Waits for a free slot when the pool is exhausted and fails with
    /// `HarnessError::Timeout` once the acquire timeout passes. The
    /// waiting counter covers the whole call, so it drops back even when
    /// the factory fails.
    pub async fn get(&self) -> Result<PooledConnection> {
        let _waiting = CountGuard::enter(&self.core.waiting);

        let permit = tokio::time::timeout(
            self.core.config.acquire_timeout(),
            self.core.permits.clone().acquire_owned(),
        )
        .await
        .map_err(|_| {
            HarnessError::Timeout(format!(
                "no connection available from pool {} within {:?}",
                self.core.config.name(),
                self.core.config.acquire_timeout()
            ))
        })?
        .map_err(|_| HarnessError::Connection("connection pool is shut down".into()))?;

        let (conn, opened) = match self.checkout_parked().await {
            Some(reused) => reused,
            None => {
                tracing::debug!(pool = %self.core.config.name(), "opening new connection");
                (self.core.factory.create().await?, Instant::now())
            }
        };

        self.core.borrowed.fetch_add(1, Ordering::SeqCst);
        Ok(PooledConnection {
            conn: Some(conn),
            opened,
            core: Arc::clone(&self.core),
            _permit: permit,
        })
    }

    /// Pop parked connections until one passes the age and validity
    /// checks; expired ones are closed and discarded on the way.
    async fn checkout_parked(&self) -> Option<(Arc<dyn Connection>, Instant)> {
        loop {
            let entry = self.core.idle.lock().pop()?;

            let over_lifetime = self
                .core
                .config
                .max_lifetime()
                .is_some_and(|limit| entry.opened.elapsed() > limit);
            let idled_out = entry.parked.elapsed() > self.core.config.idle_timeout();

            if over_lifetime || idled_out {
                let _ = entry.conn.close().await;
                continue;
            }
            if !self.core.factory.validate(entry.conn.as_ref()).await {
                let _ = entry.conn.close().await;
                continue;
            }
            return Some((entry.conn, entry.opened));
        }
    }

    pub fn stats(&self) -> PoolStats {
        PoolStats::new(
            self.core.idle.lock().len(),
            self.core.borrowed.load(Ordering::SeqCst),
            self.core.waiting.load(Ordering::SeqCst),
        )
    }

    pub fn config(&self) -> &PoolConfig {
        &self.core.config
    }

    /// Connections currently borrowed by callers
    pub fn active(&self) -> usize {
        self.core.borrowed.load(Ordering::SeqCst)
    }

    /// Close and discard every parked connection.
    pub async fn close_idle(&self) {
        let drained: Vec<Parked> = {
            let mut idle = self.core.idle.lock();
            idle.drain(..).collect()
        };
        for entry in drained {
            let _ = entry.conn.close().await;
        }
    }
}

impl std::fmt::Debug for ConnectionPool {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("name", &self.core.config.name())
            .field("stats", &self.stats())
            .finish()
    }
}

/// A borrowed connection; parks itself back into the pool on drop.
///
/// Owns its pool handle, so it can outlive the `ConnectionPool` value it
/// was borrowed from (the registry hands pools across tasks).
pub struct PooledConnection {
    conn: Option<Arc<dyn Connection>>,
    opened: Instant,
    core: Arc<PoolCore>,
    _permit: OwnedSemaphorePermit,
}

impl std::fmt::Debug for PooledConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("opened", &self.opened)
            .finish()
    }
}

impl PooledConnection {
    /// The underlying connection, for callers that need the `Arc` itself.
    pub fn inner(&self) -> &Arc<dyn Connection> {
        match &self.conn {
            Some(conn) => conn,
            // Only `Drop` takes the connection out.
            None => unreachable!("pooled connection already returned"),
        }
    }
}

impl Deref for PooledConnection {
    type Target = dyn Connection;

    fn deref(&self) -> &Self::Target {
        self.inner().as_ref()
    }
}

impl Drop for PooledConnection {
    fn drop(&mut self) {
        if let Some(conn) = self.conn.take() {
            self.core.park(conn, self.opened);
        }
    }
}
