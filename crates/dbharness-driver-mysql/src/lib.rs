//! MySQL wire-protocol driver
//!
//! Serves every engine in the harness that speaks the MySQL protocol:
//! MySQL itself, MariaDB, TiDB and OceanBase.

mod connection;
mod driver;

pub use connection::{MySqlConnection, MySqlTransaction};
pub use driver::MySqlDriver;
