//! Deduplicating pool registry
//!
//! Containers come and go during a test run, but several tests often point
//! at the same server with the same credentials. The registry hands out one
//! shared [`ConnectionPool`] per distinct connection signature, and also
//! keeps hold of raw single-use connections so the end-of-run sweep can
//! close whatever a test forgot to.

use std::collections::HashMap;
use std::sync::Arc;

use dbharness_core::Connection;
use parking_lot::Mutex;

use super::config::PoolConfig;
use super::pool::{ConnectionFactory, ConnectionPool};

/// Identity of a pool: same signature means same pool.
///
/// The URL is credential-free (see the drivers' `build_connection_string`);
/// username and password are separate fields, and both participate in the
/// identity so that reconnecting to the same server with different
/// credentials yields a different pool.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct PoolSignature {
    /// Driver ID (e.g., "postgres", "mysql")
    pub driver: String,
    /// Server URL including host, mapped port and database, no credentials
    pub url: String,
    /// Username
    pub username: String,
    /// Password
    pub password: String,
}

impl PoolSignature {
    pub fn new(
        driver: impl Into<String>,
        url: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            driver: driver.into(),
            url: url.into(),
            username: username.into(),
            password: password.into(),
        }
    }
}

// Manual Debug to keep the password out of logs.
impl std::fmt::Debug for PoolSignature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolSignature")
            .field("driver", &self.driver)
            .field("url", &self.url)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Build the conventional pool name for a containerized database.
pub fn pool_name(driver: &str, database: &str) -> String {
    format!("{}_testcontainer.{}", driver, database)
}

/// Registry of live connection pools, keyed by [`PoolSignature`].
///
/// Owns every pool it creates plus the raw connections registered via
/// [`PoolRegistry::track`]. Call [`PoolRegistry::shutdown`] at the end of
/// a run to close everything and surface what was left open.
#[derive(Default)]
pub struct PoolRegistry {
    pools: Mutex<HashMap<PoolSignature, Arc<ConnectionPool>>>,
    tracked: Mutex<Vec<Arc<dyn Connection>>>,
}

impl PoolRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get the pool for a signature, creating it on first request.
    ///
    /// `init` is only invoked when no pool exists for the signature yet;
    /// on a hit the existing pool is returned untouched. Two signatures
    /// resolving to the same pool name usually means a misconfigured
    /// caller, so that case is logged.
    pub fn get_or_create<F>(
        &self,
        signature: PoolSignature,
        init: impl FnOnce() -> (PoolConfig, F),
    ) -> Arc<ConnectionPool>
    where
        F: ConnectionFactory,
    {
        let mut pools = self.pools.lock();
        if let Some(existing) = pools.get(&signature) {
            tracing::info!(
                pool = %existing.config().name(),
                url = %signature.url,
                "reusing existing pool"
            );
            return Arc::clone(existing);
        }

        let (config, factory) = init();
        if pools
            .values()
            .any(|pool| pool.config().name() == config.name())
        {
            tracing::warn!(
                pool = %config.name(),
                url = %signature.url,
                "pool name collides with an existing pool under a different signature"
            );
        }

        let pool = Arc::new(ConnectionPool::new(config, factory));
        pools.insert(signature, Arc::clone(&pool));
        pool
    }

    /// Look up an existing pool without creating one.
    pub fn get(&self, signature: &PoolSignature) -> Option<Arc<ConnectionPool>> {
        self.pools.lock().get(signature).map(Arc::clone)
    }

    /// Record a raw single-use connection for the end-of-run sweep.
    ///
    /// Already-closed entries are pruned on the way, so the list stays
    /// proportional to what is actually open.
    pub fn track(&self, conn: Arc<dyn Connection>) {
        let mut tracked = self.tracked.lock();
        tracked.retain(|c| !c.is_closed());
        tracked.push(conn);
    }

    /// Raw connections currently tracked and not yet closed
    pub fn tracked_open(&self) -> usize {
        self.tracked.lock().iter().filter(|c| !c.is_closed()).count()
    }

    /// Close and remove the pool for a signature, if one exists.
    ///
    /// Used when the container behind the pool is about to stop.
    pub async fn evict(&self, signature: &PoolSignature) {
        let removed = self.pools.lock().remove(signature);
        if let Some(pool) = removed {
            tracing::debug!(pool = %pool.config().name(), "evicting pool");
            pool.close_idle().await;
        }
    }

    /// Number of registered pools
    pub fn len(&self) -> usize {
        self.pools.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.lock().is_empty()
    }

    /// The sweep: close every pool and every tracked raw connection.
    ///
    /// Each pool's final stats are logged on the way out. Connections
    /// still open at this point indicate a leak in the calling code and
    /// are reported, then closed anyway.
    pub async fn shutdown(&self) {
        let drained: Vec<_> = {
            let mut pools = self.pools.lock();
            pools.drain().collect()
        };
        for (signature, pool) in drained {
            let stats = pool.stats();
            tracing::info!(
                pool = %pool.config().name(),
                url = %signature.url,
                %stats,
                "closing pool"
            );
            if stats.active() > 0 {
                tracing::warn!(
                    pool = %pool.config().name(),
                    active = stats.active(),
                    "a connection was left open"
                );
            }
            pool.close_idle().await;
        }

        let tracked: Vec<_> = {
            let mut tracked = self.tracked.lock();
            tracked.drain(..).collect()
        };
        for conn in tracked {
            if conn.is_closed() {
                continue;
            }
            tracing::warn!(driver = %conn.driver_name(), "a connection was left open");
            if let Err(e) = conn.close().await {
                tracing::warn!(driver = %conn.driver_name(), error = %e, "failed to close connection");
            }
        }
    }
}

impl std::fmt::Debug for PoolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolRegistry")
            .field("pools", &self.len())
            .field("tracked_open", &self.tracked_open())
            .finish()
    }
}
