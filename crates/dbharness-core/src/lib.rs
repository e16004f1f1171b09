//! dbharness core - shared abstractions for the database test harness
//!
//! This crate provides the fundamental traits and types that all other
//! dbharness crates depend on. It defines:
//!
//! - `DatabaseDriver` - Trait for database driver implementations
//! - `Connection` / `Transaction` - Traits for live database connections
//! - `ServerInfo` - Server and client-library metadata
//! - Common types like `Value`, `Row`, `QueryResult`, etc.

mod connection;
mod driver;
mod error;
mod types;

pub use connection::*;
pub use driver::*;
pub use error::*;
pub use types::*;
