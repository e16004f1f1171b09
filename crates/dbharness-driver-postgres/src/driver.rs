//! PostgreSQL driver implementation

use async_trait::async_trait;
use std::sync::Arc;

use dbharness_core::{
    Connection, ConnectionConfig, DatabaseDriver, HarnessError, ParamStyle, Result,
};

use crate::PostgresConnection;

/// PostgreSQL database driver
pub struct PostgresDriver;

impl PostgresDriver {
    /// Create a new PostgreSQL driver instance
    pub fn new() -> Self {
        tracing::debug!("PostgreSQL driver initialized");
        Self
    }
}

impl Default for PostgresDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseDriver for PostgresDriver {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn display_name(&self) -> &'static str {
        "PostgreSQL"
    }

    fn default_port(&self) -> u16 {
        5432
    }

    fn param_style(&self) -> ParamStyle {
        ParamStyle::Dollar
    }

    #[tracing::instrument(skip(self, config), fields(host = config.get_string("host").as_deref(), database = config.get_string("database").as_deref()))]
    async fn connect(&self, config: &ConnectionConfig) -> Result<Arc<dyn Connection>> {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 5432 };
        let database = config
            .get_string("database")
            .unwrap_or_else(|| "postgres".to_string());
        let user = config
            .get_string("user")
            .or_else(|| config.get_string("username"));
        let password = config.get_string("password");

        let conn = PostgresConnection::connect(
            &host,
            port,
            &database,
            user.as_deref(),
            password.as_deref(),
        )
        .await
        .map_err(|e| {
            tracing::error!(error = %e, "failed to connect to PostgreSQL database");
            HarnessError::Connection(format!("Failed to connect to PostgreSQL database: {}", e))
        })?;

        tracing::info!(host = %host, port = %port, database = %database, "PostgreSQL connection created");
        Ok(Arc::new(conn))
    }

    #[tracing::instrument(skip(self, config))]
    async fn test_connection(&self, config: &ConnectionConfig) -> Result<()> {
        tracing::debug!("testing PostgreSQL connection");
        let conn = self.connect(config).await?;
        conn.query("SELECT 1", &[]).await?;
        Ok(())
    }

    /// Build the server URL for this config.
    ///
    /// Credentials are deliberately left out: the URL ends up in pool
    /// signatures and log lines, and `connect` receives the username and
    /// password through the config itself.
    fn build_connection_string(&self, config: &ConnectionConfig) -> String {
        let host = config
            .get_string("host")
            .unwrap_or_else(|| "localhost".to_string());
        let port = if config.port > 0 { config.port } else { 5432 };

        let mut conn_str = format!("postgresql://{}:{}", host, port);
        if let Some(db) = config.get_string("database") {
            conn_str.push('/');
            conn_str.push_str(&db);
        }
        conn_str
    }
}
