//! Connection pooling for database connections
//!
//! This crate provides connection pooling with configurable pool sizes,
//! timeouts, and statistics tracking, plus a [`PoolRegistry`] that
//! deduplicates pools by connection signature so that repeated requests
//! for the same server and credentials share one pool. The registry also
//! tracks raw single-use connections ([`PoolRegistry::track`]) so its
//! end-of-run [`PoolRegistry::shutdown`] sweep can close stragglers.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//! use dbharness_pool::{ConnectionPool, PoolConfig};
//!
//! let config = PoolConfig::new(1, 5)
//!     .with_name("postgres_testcontainer.demo")
//!     .with_acquire_timeout(Duration::from_secs(5));
//!
//! let pool = ConnectionPool::new(config, connection_factory);
//! let conn = pool.get().await?;
//! // Connection returned to pool on drop
//! ```

mod config;
mod pool;
mod registry;
mod stats;

#[cfg(test)]
mod tests;

pub use config::PoolConfig;
pub use pool::{ConnectionFactory, ConnectionPool, PooledConnection};
pub use registry::{pool_name, PoolRegistry, PoolSignature};
pub use stats::PoolStats;
