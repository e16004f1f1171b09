//! Pool sizing and timeout settings

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Settings a [`crate::ConnectionPool`] is built from.
///
/// The name is what the pool reports in log output; for containerized
/// databases it follows the `{driver}_testcontainer.{database}` scheme
/// (see [`crate::pool_name`]).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PoolConfig {
    name: Option<String>,
    min_size: usize,
    max_size: usize,
    acquire_timeout: Duration,
    idle_timeout: Duration,
    max_lifetime: Option<Duration>,
}

impl PoolConfig {
    /// Pool bounded to at most `max_size` concurrent connections.
    ///
    /// # Panics
    ///
    /// Panics when `max_size` is zero or `min_size` exceeds it; both are
    /// programming errors in the caller, not runtime conditions.
    pub fn new(min_size: usize, max_size: usize) -> Self {
        assert!(max_size > 0, "max_size must be greater than 0");
        assert!(
            min_size <= max_size,
            "min_size ({}) cannot exceed max_size ({})",
            min_size,
            max_size
        );
        Self {
            name: None,
            min_size,
            max_size,
            acquire_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
            max_lifetime: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// How long `get` may block before giving up
    pub fn with_acquire_timeout(mut self, timeout: Duration) -> Self {
        self.acquire_timeout = timeout;
        self
    }

    /// How long a parked connection survives before it is discarded
    pub fn with_idle_timeout(mut self, timeout: Duration) -> Self {
        self.idle_timeout = timeout;
        self
    }

    /// Age at which a connection is recycled instead of reused
    pub fn with_max_lifetime(mut self, lifetime: Duration) -> Self {
        self.max_lifetime = Some(lifetime);
        self
    }

    /// The pool name, or "unnamed" when none was set
    pub fn name(&self) -> &str {
        self.name.as_deref().unwrap_or("unnamed")
    }

    pub fn min_size(&self) -> usize {
        self.min_size
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }

    pub fn acquire_timeout(&self) -> Duration {
        self.acquire_timeout
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub fn max_lifetime(&self) -> Option<Duration> {
        self.max_lifetime
    }
}

impl Default for PoolConfig {
    /// One to ten connections, 30s acquire timeout, 10min idle timeout.
    fn default() -> Self {
        Self::new(1, 10)
    }
}
