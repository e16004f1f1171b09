//! dbharness integration test suite
//!
//! Fixtures and integration tests exercising the whole stack against real
//! database servers: container lifecycle, guest-OS probing, pool
//! deduplication, schema migration and the reference-data repositories.
//!
//! Containers start automatically through testcontainers and are shared
//! across tests in the same process; the first test per engine pays the
//! startup cost, the rest reuse the running server.
//!
//! ```bash
//! # Run the full suite (Docker required, containers start automatically)
//! cargo test -p dbharness-testkit
//!
//! # Pin a different image for one engine
//! export DBHARNESS_IMAGE_POSTGRES=postgres:15.7
//! cargo test -p dbharness-testkit
//! ```

pub mod config;
pub mod fixtures;

#[cfg(test)]
mod container_tests;

#[cfg(test)]
mod migration_tests;

#[cfg(test)]
mod pool_tests;

#[cfg(test)]
mod refdata_tests;
