//! Container lifecycle and enhancement tests
//!
//! Verifies the wrapper around a live server: connectivity, the guest-OS
//! probe, extension listing, package management and the stop sweep.

use std::sync::Arc;

use anyhow::Result;
use rstest::rstest;

use dbharness_containers::{DatabaseContainer, EngineProfile, Packaging};
use dbharness_core::HarnessError;
use dbharness_pool::PoolRegistry;

use crate::fixtures::{test_container, TestEngine};

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn container_answers_its_test_query(#[case] engine: TestEngine) -> Result<()> {
    let container = test_container(engine).await?;
    assert!(container.port() > 0);

    let conn = container.connect().await?;
    assert_eq!(conn.driver_name(), engine.driver_name());

    let result = conn.query(&container.profile().test_query, &[]).await?;
    assert_eq!(result.rows.len(), 1);
    conn.close().await?;
    Ok(())
}

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn guest_probe_reports_distro_and_server(#[case] engine: TestEngine) -> Result<()> {
    let container = test_container(engine).await?;

    let details = container.guest_details().await?;
    assert!(details.os_id().is_some(), "os-release should expose an ID");
    assert!(!details.server.product_name.is_empty());
    assert!(!details.server.product_version.is_empty());
    assert!(!details.server.driver_name.is_empty());

    // cached: a second probe must return the same answer without re-exec
    let again = container.guest_details().await?;
    assert_eq!(details.os_id(), again.os_id());
    assert_eq!(details.server.product_version, again.server.product_version);
    Ok(())
}

#[tokio::test]
async fn postgres_image_is_debian_based() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;
    let details = container.guest_details().await?;
    assert_eq!(details.packaging(), Packaging::Debian);
    Ok(())
}

#[tokio::test]
async fn postgres_lists_server_extensions() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;

    let available = container.available_extensions().await?;
    assert!(!available.is_empty());

    // plpgsql ships installed in every stock postgres image
    let installed = container.installed_extensions().await?;
    assert!(installed.iter().any(|e| e.name == "plpgsql"));

    let found = container.find_installed_extension("plpgsql").await?;
    let found = found.expect("plpgsql should be installed");
    assert!(found.is_installed());

    let missing = container.find_installed_extension("no_such_extension").await?;
    assert!(missing.is_none());
    Ok(())
}

#[tokio::test]
async fn mysql_has_no_extension_catalog() -> Result<()> {
    let container = test_container(TestEngine::MySql).await?;
    let err = container.available_extensions().await.unwrap_err();
    assert!(matches!(err, HarnessError::NotSupported(_)), "got {err:?}");
    Ok(())
}

#[tokio::test]
async fn debian_package_index_can_be_refreshed() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;
    let output = container.update_packages().await?;
    let output = output.expect("debian guest should run apt-get");
    assert!(output.success(), "stderr: {}", output.stderr);
    Ok(())
}

#[tokio::test]
async fn postgres_soft_bounce_reloads_config() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;
    let output = container.soft_bounce().await?;
    let output = output.expect("postgres profile carries a soft-bounce command");
    assert!(output.success(), "stderr: {}", output.stderr);
    Ok(())
}

#[tokio::test]
async fn exec_returns_output_and_exit_code() -> Result<()> {
    let container = test_container(TestEngine::Postgres).await?;

    let ok = container.exec(&["echo", "hello"]).await?;
    assert!(ok.success());
    assert_eq!(ok.stdout.trim(), "hello");

    let failed = container.exec(&["cat", "/no/such/file"]).await?;
    assert!(!failed.success());
    Ok(())
}

/// Dedicated container so stopping it cannot disturb the shared fixtures.
#[tokio::test]
async fn stop_evicts_pools_and_is_idempotent() -> Result<()> {
    crate::config::tracing_init();
    let registry = Arc::new(PoolRegistry::new());
    let container =
        DatabaseContainer::start(EngineProfile::postgres(), Arc::clone(&registry)).await?;

    let pool = container.pool().await?;
    {
        let conn = pool.get().await?;
        conn.query("SELECT 1", &[]).await?;
    }
    assert_eq!(registry.len(), 1);

    container.stop().await?;
    assert!(registry.is_empty(), "stop must evict this container's pool");

    // second stop is a no-op
    container.stop().await?;
    Ok(())
}
