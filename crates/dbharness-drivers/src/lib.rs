//! dbharness drivers - database driver implementations
//!
//! This crate provides concrete implementations of the driver traits
//! defined in `dbharness-core`, plus a registry to look them up by name.

#[cfg(feature = "mysql")]
pub use dbharness_driver_mysql as mysql;
#[cfg(feature = "postgres")]
pub use dbharness_driver_postgres as postgres;

mod registry;

pub use registry::DriverRegistry;

/// Re-export commonly used types from dbharness-core
pub use dbharness_core::{
    ColumnMeta, Connection, ConnectionConfig, DatabaseDriver, HarnessError, ParamStyle,
    QueryResult, Result, Row, ServerInfo, StatementResult, Transaction, Value,
};
