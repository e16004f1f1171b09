//! Connection trait and transaction handling

use crate::{ParamStyle, QueryResult, Result, StatementResult, Value};
use async_trait::async_trait;

/// Server and client-library metadata reported by a live connection.
///
/// Mirrors what the server advertises about itself plus what the driver
/// knows about its own version. Used by the guest OS probe to build the
/// full environment picture for an engine.
#[derive(Debug, Clone, Default)]
pub struct ServerInfo {
    /// Product name as reported by the server (e.g., "PostgreSQL", "MySQL")
    pub product_name: String,
    /// Full product version string (e.g., "16.3 (Debian 16.3-1.pgdg120+1)")
    pub product_version: String,
    /// Name of the driver crate used for the connection
    pub driver_name: String,
    /// Version of the driver crate
    pub driver_version: String,
}

/// A database connection
#[async_trait]
pub trait Connection: Send + Sync {
    /// Get the driver name (e.g., "postgres", "mysql")
    fn driver_name(&self) -> &str;

    /// Parameter placeholder style this connection expects
    fn param_style(&self) -> ParamStyle;

    /// Execute a statement that modifies data (INSERT/UPDATE/DELETE/DDL)
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;

    /// Execute a query that returns rows (SELECT)
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Begin a transaction
    async fn begin_transaction(&self) -> Result<Box<dyn Transaction>>;

    /// Query server and driver version metadata
    async fn server_info(&self) -> Result<ServerInfo>;

    /// Close the connection
    async fn close(&self) -> Result<()>;

    /// Check if the connection is closed
    fn is_closed(&self) -> bool;
}

/// A database transaction
#[async_trait]
pub trait Transaction: Send + Sync {
    /// Commit the transaction
    async fn commit(self: Box<Self>) -> Result<()>;

    /// Rollback the transaction
    async fn rollback(self: Box<Self>) -> Result<()>;

    /// Execute a query within the transaction
    async fn query(&self, sql: &str, params: &[Value]) -> Result<QueryResult>;

    /// Execute a statement within the transaction
    async fn execute(&self, sql: &str, params: &[Value]) -> Result<StatementResult>;
}
