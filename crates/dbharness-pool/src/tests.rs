//! Pool and registry tests over mock connections

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dbharness_core::{
    Connection, HarnessError, ParamStyle, QueryResult, Result, ServerInfo, StatementResult,
    Transaction, Value,
};
use pretty_assertions::assert_eq;

use super::config::PoolConfig;
use super::pool::{ConnectionFactory, ConnectionPool};
use super::registry::{pool_name, PoolRegistry, PoolSignature};
use super::stats::PoolStats;

struct MockConnection {
    closed: AtomicBool,
}

impl MockConnection {
    fn new() -> Self {
        Self {
            closed: AtomicBool::new(false),
        }
    }
}

#[async_trait]
impl Connection for MockConnection {
    fn driver_name(&self) -> &str {
        "mock"
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Question
    }

    async fn execute(&self, _sql: &str, _params: &[Value]) -> Result<StatementResult> {
        Ok(StatementResult {
            affected_rows: 0,
            execution_time_ms: 0,
        })
    }

    async fn query(&self, _sql: &str, _params: &[Value]) -> Result<QueryResult> {
        Ok(QueryResult::empty())
    }

    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>> {
        Err(HarnessError::NotSupported("mock".into()))
    }

    async fn server_info(&self) -> Result<ServerInfo> {
        Ok(ServerInfo::default())
    }

    async fn close(&self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Counts the connections it opened; can be told to fail the next opens.
struct MockFactory {
    created: AtomicUsize,
    failures_left: AtomicUsize,
}

impl MockFactory {
    fn new() -> Self {
        Self {
            created: AtomicUsize::new(0),
            failures_left: AtomicUsize::new(0),
        }
    }

    fn failing(times: usize) -> Self {
        let factory = Self::new();
        factory.failures_left.store(times, Ordering::SeqCst);
        factory
    }

    fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ConnectionFactory for MockFactory {
    async fn create(&self) -> Result<Arc<dyn Connection>> {
        if self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Err(HarnessError::Connection("server refused".into()));
        }
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(MockConnection::new()))
    }
}

#[test]
fn config_defaults_and_builders() {
    let config = PoolConfig::new(2, 8);
    assert_eq!(config.min_size(), 2);
    assert_eq!(config.max_size(), 8);
    assert_eq!(config.acquire_timeout(), Duration::from_secs(30));
    assert_eq!(config.name(), "unnamed");

    let config = config
        .with_name("postgres_testcontainer.demo")
        .with_acquire_timeout(Duration::from_millis(250))
        .with_idle_timeout(Duration::from_secs(60))
        .with_max_lifetime(Duration::from_secs(3600));
    assert_eq!(config.name(), "postgres_testcontainer.demo");
    assert_eq!(config.acquire_timeout(), Duration::from_millis(250));
    assert_eq!(config.max_lifetime(), Some(Duration::from_secs(3600)));
}

#[test]
#[should_panic(expected = "max_size must be greater than 0")]
fn config_rejects_zero_max_size() {
    PoolConfig::new(0, 0);
}

#[test]
#[should_panic(expected = "min_size (10) cannot exceed max_size (5)")]
fn config_rejects_min_above_max() {
    PoolConfig::new(10, 5);
}

#[test]
fn stats_render_in_sweep_log_form() {
    let stats = PoolStats::new(2, 1, 0);
    assert_eq!(stats.total(), 3);
    assert_eq!(stats.to_string(), "total=3, active=1, idle=2, waiting=0");
}

#[tokio::test]
async fn checkout_creates_then_reuses() {
    let factory = Arc::new(MockFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(1, 5), Arc::clone(&factory));

    {
        let conn = pool.get().await.expect("first get");
        assert_eq!(conn.driver_name(), "mock");
        assert_eq!(pool.stats().active(), 1);
    }

    assert_eq!(pool.stats().active(), 0);
    assert_eq!(pool.stats().idle(), 1);

    let _conn = pool.get().await.expect("second get");
    assert_eq!(factory.created(), 1, "second get must reuse the parked connection");
}

#[tokio::test]
async fn exhausted_pool_times_out() {
    let config = PoolConfig::new(1, 2).with_acquire_timeout(Duration::from_millis(50));
    let pool = ConnectionPool::new(config, MockFactory::new());

    let _one = pool.get().await.expect("get one");
    let _two = pool.get().await.expect("get two");

    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, HarnessError::Timeout(_)), "got {err:?}");
    assert_eq!(pool.stats().waiting(), 0, "timed-out waiter must not linger");
}

#[tokio::test]
async fn factory_failure_releases_the_waiting_slot() {
    let factory = Arc::new(MockFactory::failing(1));
    let pool = ConnectionPool::new(PoolConfig::new(1, 2), Arc::clone(&factory));

    let err = pool.get().await.unwrap_err();
    assert!(matches!(err, HarnessError::Connection(_)), "got {err:?}");
    assert_eq!(pool.stats().waiting(), 0, "failed checkout must not leak a waiter");
    assert_eq!(pool.stats().active(), 0);

    // the pool recovers once the server accepts connections again
    let conn = pool.get().await.expect("retry after failure");
    assert_eq!(conn.driver_name(), "mock");
    assert_eq!(pool.stats().waiting(), 0);
}

#[tokio::test]
async fn closed_connections_are_not_parked() {
    let factory = Arc::new(MockFactory::new());
    let pool = ConnectionPool::new(PoolConfig::new(1, 5), Arc::clone(&factory));

    {
        let conn = pool.get().await.expect("get");
        conn.close().await.expect("close");
    }

    assert_eq!(pool.stats().idle(), 0);

    let _conn = pool.get().await.expect("get again");
    assert_eq!(factory.created(), 2, "closed connection must be replaced, not reused");
}

#[tokio::test]
async fn close_idle_discards_parked_connections() {
    let pool = ConnectionPool::new(PoolConfig::new(1, 5), MockFactory::new());

    {
        let _one = pool.get().await.expect("get");
        let _two = pool.get().await.expect("get");
    }
    assert_eq!(pool.stats().idle(), 2);

    pool.close_idle().await;
    assert_eq!(pool.stats().idle(), 0);
}

fn signature(url: &str, password: &str) -> PoolSignature {
    PoolSignature::new("mock", url, "tester", password)
}

fn init_pool() -> (PoolConfig, MockFactory) {
    (PoolConfig::new(1, 5), MockFactory::new())
}

#[test]
fn pool_name_convention() {
    assert_eq!(pool_name("postgres", "demo"), "postgres_testcontainer.demo");
    assert_eq!(pool_name("mysql", "i18n"), "mysql_testcontainer.i18n");
}

#[tokio::test]
async fn registry_dedups_by_signature() {
    let registry = PoolRegistry::new();

    let a = registry.get_or_create(signature("mock://host:1/db", "pw"), init_pool);
    let b = registry.get_or_create(signature("mock://host:1/db", "pw"), init_pool);

    assert!(Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 1);
}

#[tokio::test]
async fn registry_separates_credentials() {
    let registry = PoolRegistry::new();

    let a = registry.get_or_create(signature("mock://host:1/db", "pw1"), init_pool);
    let b = registry.get_or_create(signature("mock://host:1/db", "pw2"), init_pool);

    assert!(!Arc::ptr_eq(&a, &b));
    assert_eq!(registry.len(), 2);
}

#[tokio::test]
async fn registry_evicts_on_request() {
    let registry = PoolRegistry::new();
    let sig = signature("mock://host:1/db", "pw");

    let _pool = registry.get_or_create(sig.clone(), init_pool);
    assert_eq!(registry.len(), 1);

    registry.evict(&sig).await;
    assert!(registry.is_empty());
    assert!(registry.get(&sig).is_none());
}

#[tokio::test]
async fn shutdown_closes_pools_and_tracked_connections() {
    let registry = PoolRegistry::new();

    let pool = registry.get_or_create(signature("mock://a:1/db", "pw"), init_pool);
    {
        let _conn = pool.get().await.expect("get");
    }
    assert_eq!(pool.stats().idle(), 1);

    // a raw single-use connection the caller forgot to close
    let leaked: Arc<dyn Connection> = Arc::new(MockConnection::new());
    registry.track(Arc::clone(&leaked));
    assert_eq!(registry.tracked_open(), 1);

    registry.shutdown().await;

    assert!(registry.is_empty());
    assert_eq!(pool.stats().idle(), 0);
    assert!(leaked.is_closed(), "sweep must close tracked connections");
    assert_eq!(registry.tracked_open(), 0);
}

#[tokio::test]
async fn tracking_prunes_closed_connections() {
    let registry = PoolRegistry::new();

    let first: Arc<dyn Connection> = Arc::new(MockConnection::new());
    registry.track(Arc::clone(&first));
    first.close().await.expect("close");

    let second: Arc<dyn Connection> = Arc::new(MockConnection::new());
    registry.track(second);

    assert_eq!(registry.tracked_open(), 1);
}

#[test]
fn signature_debug_redacts_password() {
    let sig = signature("mock://host:1/db", "hunter2");
    let debug = format!("{:?}", sig);
    assert!(!debug.contains("hunter2"));
    assert!(debug.contains("<redacted>"));
}
