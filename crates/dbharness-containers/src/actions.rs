//! Lifecycle actions
//!
//! Actions run against a freshly started container (post-construct) or just
//! before it stops (pre-destroy). They bundle setup steps a suite would
//! otherwise repeat in every test: running schema migrations, refreshing
//! the guest's package index, flushing state before teardown.

use async_trait::async_trait;

use dbharness_core::{HarnessError, Result};
use dbharness_migrate::Migrator;

use crate::container::DatabaseContainer;

/// An action applied right after the container's server is ready.
#[async_trait(?Send)]
pub trait PostConstructAction: Send + Sync {
    /// Human-readable name, used in lifecycle logs
    fn name(&self) -> &str;

    async fn apply(&self, container: &DatabaseContainer) -> Result<()>;
}

/// An action applied just before the container stops.
#[async_trait(?Send)]
pub trait PreDestroyAction: Send + Sync {
    fn name(&self) -> &str;

    async fn apply(&self, container: &DatabaseContainer) -> Result<()>;
}

/// Post-construct action that brings the schema up to date.
///
/// Runs the migrator over a dedicated single-use connection. Containers
/// without a bundled driver are skipped rather than failed, so the same
/// action list can be reused across engines.
pub struct MigrateAction {
    migrator: Migrator,
}

impl MigrateAction {
    pub fn new(migrator: Migrator) -> Self {
        Self { migrator }
    }
}

#[async_trait(?Send)]
impl PostConstructAction for MigrateAction {
    fn name(&self) -> &str {
        "migrate database schema"
    }

    async fn apply(&self, container: &DatabaseContainer) -> Result<()> {
        let conn = match container.connect().await {
            Ok(conn) => conn,
            Err(HarnessError::NotSupported(reason)) => {
                tracing::info!(engine = %container.engine(), %reason, "skipping schema migration");
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let report = self.migrator.migrate(conn.as_ref()).await?;
        tracing::info!(
            engine = %container.engine(),
            applied = report.applied.len(),
            already_applied = report.already_applied,
            "schema migration complete"
        );
        conn.close().await?;
        Ok(())
    }
}

/// Post-construct action that refreshes the guest's package index.
///
/// Useful before installing diagnostic tooling into a container. A guest
/// with an unrecognized package format is skipped.
pub struct UpdatePackagesAction;

#[async_trait(?Send)]
impl PostConstructAction for UpdatePackagesAction {
    fn name(&self) -> &str {
        "update package index"
    }

    async fn apply(&self, container: &DatabaseContainer) -> Result<()> {
        match container.update_packages().await? {
            Some(output) if !output.success() => {
                tracing::warn!(
                    engine = %container.engine(),
                    exit_code = output.exit_code,
                    stderr = %output.stderr.trim(),
                    "package index update failed"
                );
            }
            Some(_) => {}
            None => {
                tracing::info!(engine = %container.engine(), "package index update skipped");
            }
        }
        Ok(())
    }
}
