//! Versioned SQL migration runner
//!
//! Applies `V{n}__description.sql` migrations against any [`Connection`],
//! tracking what ran in a `schema_history` table and verifying checksums
//! so an edited migration is caught instead of silently diverging.
//!
//! [`Connection`]: dbharness_core::Connection

mod migration;
mod migrator;

pub use migration::{split_statements, Migration};
pub use migrator::{MigrateReport, Migrator, DEFAULT_HISTORY_TABLE};
