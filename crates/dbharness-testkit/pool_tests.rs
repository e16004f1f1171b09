//! Pool deduplication tests against live servers
//!
//! The pool registry's core semantics are unit-tested with mocks in
//! `dbharness-pool`; these tests confirm the container wrapper feeds it
//! signatures that actually deduplicate.

use std::sync::Arc;

use anyhow::Result;
use rstest::rstest;

use dbharness_pool::PoolConfig;

use crate::fixtures::{test_container, TestEngine};

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn identical_signatures_share_one_pool(#[case] engine: TestEngine) -> Result<()> {
    let container = test_container(engine).await?;

    let first = container.pool().await?;
    let second = container.pool().await?;
    assert!(
        Arc::ptr_eq(&first, &second),
        "same container must reuse the same pool"
    );
    Ok(())
}

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn pooled_connections_run_queries(#[case] engine: TestEngine) -> Result<()> {
    let container = test_container(engine).await?;
    let pool = container.pool_with(PoolConfig::new(1, 4)).await?;

    {
        let conn = pool.get().await?;
        let result = conn.query(&container.profile().test_query, &[]).await?;
        assert_eq!(result.rows.len(), 1);
    }

    // returned on drop
    let stats = pool.stats();
    assert_eq!(stats.active(), 0);
    assert!(stats.idle() >= 1);
    Ok(())
}

#[tokio::test]
async fn pool_name_follows_container_convention() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;
    let pool = container.pool().await?;
    assert_eq!(pool.config().name(), "postgres_testcontainer.test");
    Ok(())
}

#[tokio::test]
async fn signatures_with_different_credentials_differ() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;
    let signature = container.pool_signature()?;
    assert_eq!(signature.driver, "postgres");
    assert!(signature.url.contains(&container.port().to_string()));
    // credentials live in their own fields, never in the logged URL
    assert!(!signature.url.contains('@'));

    let mut other = signature.clone();
    other.username = "someone_else".to_string();
    assert_ne!(signature, other);
    Ok(())
}
