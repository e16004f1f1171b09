//! PostgreSQL wire-protocol driver
//!
//! Serves every engine in the harness that speaks the PostgreSQL protocol:
//! PostgreSQL itself, TimescaleDB, CockroachDB, YugabyteDB and QuestDB.

mod connection;
mod driver;

pub use connection::{PostgresConnection, PostgresTransaction};
pub use driver::PostgresDriver;
