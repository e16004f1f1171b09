//! dbharness refdata - localized reference data
//!
//! Models, repositories and schema migrations for the `i18n_language` and
//! `i18n_region` lookup tables. The repositories are wire-family agnostic;
//! pair them with any connection produced by the driver crates.

mod models;
mod repository;

pub use models::{I18nLanguage, I18nRegion};
pub use repository::{
    I18nLanguageRepository, I18nRegionRepository, SqlI18nLanguageRepository,
    SqlI18nRegionRepository,
};

use dbharness_core::Result;
use dbharness_migrate::{Migration, Migrator};

/// The embedded schema migrations for the reference tables, in order.
pub fn migrations() -> Result<Vec<Migration>> {
    Ok(vec![
        Migration::parse(
            "V1__create_i18n_language.sql",
            include_str!("../migrations/V1__create_i18n_language.sql"),
        )?,
        Migration::parse(
            "V2__create_i18n_region.sql",
            include_str!("../migrations/V2__create_i18n_region.sql"),
        )?,
    ])
}

/// A migrator preloaded with the reference-table migrations.
pub fn migrator() -> Result<Migrator> {
    Migrator::new(migrations()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn embedded_migrations_parse() {
        let migrations = migrations().unwrap();
        assert_eq!(migrations.len(), 2);
        assert_eq!(migrations[0].version, 1);
        assert_eq!(migrations[0].description, "create i18n language");
        assert_eq!(migrations[1].version, 2);
        assert!(migrations[1].sql.contains("i18n_region"));
    }

    #[test]
    fn migrator_accepts_the_embedded_set() {
        let migrator = migrator().unwrap();
        assert_eq!(migrator.migrations().len(), 2);
    }
}
