//! Shared test fixtures
//!
//! One container per engine per test process, started lazily on first use
//! and reused by every test after that. The reference-data migrations run
//! as a post-construct action, so tests can assume the schema exists.

use std::sync::Arc;

use anyhow::Result;
use once_cell::sync::Lazy;
use parking_lot::Mutex;

use dbharness_containers::{
    DatabaseContainer, EngineProfile, MigrateAction, PostConstructAction,
};
use dbharness_core::Connection;
use dbharness_pool::PoolRegistry;

use crate::config::{apply_image_override, tracing_init};

/// Pool registry shared by every fixture container in this process.
static POOL_REGISTRY: Lazy<Arc<PoolRegistry>> = Lazy::new(|| Arc::new(PoolRegistry::new()));

static POSTGRES: Lazy<Mutex<Option<Arc<DatabaseContainer>>>> = Lazy::new(|| Mutex::new(None));
static MYSQL: Lazy<Mutex<Option<Arc<DatabaseContainer>>>> = Lazy::new(|| Mutex::new(None));

/// The process-wide pool registry used by the shared containers.
pub fn pool_registry() -> Arc<PoolRegistry> {
    Arc::clone(&POOL_REGISTRY)
}

/// Engines the integration suite runs against.
///
/// One representative per wire family keeps the suite fast; the remaining
/// engines reuse the exact same driver and container code paths.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TestEngine {
    Postgres,
    MySql,
}

impl TestEngine {
    pub fn profile(&self) -> EngineProfile {
        match self {
            TestEngine::Postgres => EngineProfile::postgres(),
            TestEngine::MySql => EngineProfile::mysql(),
        }
    }

    pub fn driver_name(&self) -> &'static str {
        match self {
            TestEngine::Postgres => "postgres",
            TestEngine::MySql => "mysql",
        }
    }
}

async fn start_engine(profile: EngineProfile) -> Result<Arc<DatabaseContainer>> {
    tracing_init();
    let profile = apply_image_override(profile);
    let actions: Vec<Box<dyn PostConstructAction>> =
        vec![Box::new(MigrateAction::new(dbharness_refdata::migrator()?))];
    let container =
        DatabaseContainer::start_with_actions(profile, pool_registry(), actions).await?;
    Ok(Arc::new(container))
}

/// Get or start the shared container for an engine.
pub async fn test_container(engine: TestEngine) -> Result<Arc<DatabaseContainer>> {
    let slot = match engine {
        TestEngine::Postgres => &POSTGRES,
        TestEngine::MySql => &MYSQL,
    };

    if let Some(container) = slot.lock().as_ref() {
        return Ok(Arc::clone(container));
    }

    let container = start_engine(engine.profile()).await?;

    let mut guard = slot.lock();
    if let Some(existing) = guard.as_ref() {
        // another test won the startup race; keep theirs
        return Ok(Arc::clone(existing));
    }
    *guard = Some(Arc::clone(&container));
    Ok(container)
}

/// Fresh single-use connection to the shared container for an engine.
pub async fn test_connection(engine: TestEngine) -> Result<Arc<dyn Connection>> {
    let container = test_container(engine).await?;
    Ok(container.connect().await?)
}

static LANGUAGE_TABLE: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));
static REGION_TABLE: Lazy<tokio::sync::Mutex<()>> = Lazy::new(|| tokio::sync::Mutex::new(()));

/// Serialize tests that rewrite `i18n_language`; the test runner is
/// parallel and the fixture containers are shared.
pub async fn lock_language_table() -> tokio::sync::MutexGuard<'static, ()> {
    LANGUAGE_TABLE.lock().await
}

/// Serialize tests that rewrite `i18n_region`.
pub async fn lock_region_table() -> tokio::sync::MutexGuard<'static, ()> {
    REGION_TABLE.lock().await
}
