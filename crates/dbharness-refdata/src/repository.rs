//! Reference data repositories
//!
//! Hand-written SQL over the generic [`Connection`] trait. All statements
//! render their placeholders through the connection's [`ParamStyle`], so
//! the same repository runs unchanged against both wire families.

use std::sync::Arc;

use async_trait::async_trait;

use dbharness_core::{Connection, ParamStyle, Result, Value};

use crate::models::{I18nLanguage, I18nRegion};

/// Surrogate keys are assigned in SQL rather than by the schema: neither
/// auto-increment syntax is portable across both wire families, and the
/// reference tables are tiny and rewritten wholesale per test run.
fn insert_language_sql(style: ParamStyle) -> String {
    format!(
        "INSERT INTO i18n_language (id, code, name, hl) \
         SELECT COALESCE(MAX(id), 0) + 1, {}, {}, {} FROM i18n_language",
        style.placeholder(1),
        style.placeholder(2),
        style.placeholder(3)
    )
}

fn insert_region_sql(style: ParamStyle) -> String {
    format!(
        "INSERT INTO i18n_region (id, code, name, hl, gl) \
         SELECT COALESCE(MAX(id), 0) + 1, {}, {}, {}, {} FROM i18n_region",
        style.placeholder(1),
        style.placeholder(2),
        style.placeholder(3),
        style.placeholder(4)
    )
}

fn find_by_code_and_locale_sql(table: &str, columns: &str, style: ParamStyle) -> String {
    format!(
        "SELECT {} FROM {} WHERE code = {} AND hl = {}",
        columns,
        table,
        style.placeholder(1),
        style.placeholder(2)
    )
}

fn find_all_for_locale_sql(table: &str, columns: &str, style: ParamStyle) -> String {
    format!(
        "SELECT {} FROM {} WHERE hl = {} ORDER BY code",
        columns,
        table,
        style.placeholder(1)
    )
}

const LANGUAGE_COLUMNS: &str = "id, code, name, hl";
const REGION_COLUMNS: &str = "id, code, name, hl, gl";

/// Localized language names.
#[async_trait]
pub trait I18nLanguageRepository: Send + Sync {
    /// Remove every row, returning the number deleted.
    async fn delete_all(&self) -> Result<u64>;

    async fn insert(&self, language: &I18nLanguage) -> Result<()>;

    async fn insert_all(&self, languages: &[I18nLanguage]) -> Result<()>;

    async fn find_all(&self) -> Result<Vec<I18nLanguage>>;

    async fn find_by_code_and_locale(&self, code: &str, locale: &str)
        -> Result<Option<I18nLanguage>>;

    async fn find_all_for_locale(&self, locale: &str) -> Result<Vec<I18nLanguage>>;
}

/// Localized region names.
#[async_trait]
pub trait I18nRegionRepository: Send + Sync {
    async fn delete_all(&self) -> Result<u64>;

    async fn insert(&self, region: &I18nRegion) -> Result<()>;

    async fn insert_all(&self, regions: &[I18nRegion]) -> Result<()>;

    async fn find_all(&self) -> Result<Vec<I18nRegion>>;

    async fn find_by_code_and_locale(&self, code: &str, locale: &str) -> Result<Option<I18nRegion>>;

    async fn find_all_for_locale(&self, locale: &str) -> Result<Vec<I18nRegion>>;
}

pub struct SqlI18nLanguageRepository {
    conn: Arc<dyn Connection>,
}

impl SqlI18nLanguageRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl I18nLanguageRepository for SqlI18nLanguageRepository {
    async fn delete_all(&self) -> Result<u64> {
        let result = self.conn.execute("DELETE FROM i18n_language", &[]).await?;
        tracing::debug!(rows = result.affected_rows, "cleared i18n_language");
        Ok(result.affected_rows)
    }

    async fn insert(&self, language: &I18nLanguage) -> Result<()> {
        let sql = insert_language_sql(self.conn.param_style());
        self.conn
            .execute(
                &sql,
                &[
                    Value::String(language.code.clone()),
                    Value::String(language.name.clone()),
                    Value::String(language.hl.clone()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_all(&self, languages: &[I18nLanguage]) -> Result<()> {
        for language in languages {
            self.insert(language).await?;
        }
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<I18nLanguage>> {
        let sql = format!(
            "SELECT {} FROM i18n_language ORDER BY code, hl",
            LANGUAGE_COLUMNS
        );
        let result = self.conn.query(&sql, &[]).await?;
        result.rows.iter().map(I18nLanguage::from_row).collect()
    }

    async fn find_by_code_and_locale(
        &self,
        code: &str,
        locale: &str,
    ) -> Result<Option<I18nLanguage>> {
        let sql =
            find_by_code_and_locale_sql("i18n_language", LANGUAGE_COLUMNS, self.conn.param_style());
        let result = self
            .conn
            .query(
                &sql,
                &[
                    Value::String(code.to_string()),
                    Value::String(locale.to_string()),
                ],
            )
            .await?;
        result.rows.first().map(I18nLanguage::from_row).transpose()
    }

    async fn find_all_for_locale(&self, locale: &str) -> Result<Vec<I18nLanguage>> {
        let sql =
            find_all_for_locale_sql("i18n_language", LANGUAGE_COLUMNS, self.conn.param_style());
        let result = self
            .conn
            .query(&sql, &[Value::String(locale.to_string())])
            .await?;
        result.rows.iter().map(I18nLanguage::from_row).collect()
    }
}

pub struct SqlI18nRegionRepository {
    conn: Arc<dyn Connection>,
}

impl SqlI18nRegionRepository {
    pub fn new(conn: Arc<dyn Connection>) -> Self {
        Self { conn }
    }
}

#[async_trait]
impl I18nRegionRepository for SqlI18nRegionRepository {
    async fn delete_all(&self) -> Result<u64> {
        let result = self.conn.execute("DELETE FROM i18n_region", &[]).await?;
        tracing::debug!(rows = result.affected_rows, "cleared i18n_region");
        Ok(result.affected_rows)
    }

    async fn insert(&self, region: &I18nRegion) -> Result<()> {
        let sql = insert_region_sql(self.conn.param_style());
        self.conn
            .execute(
                &sql,
                &[
                    Value::String(region.code.clone()),
                    Value::String(region.name.clone()),
                    Value::String(region.hl.clone()),
                    Value::String(region.gl.clone()),
                ],
            )
            .await?;
        Ok(())
    }

    async fn insert_all(&self, regions: &[I18nRegion]) -> Result<()> {
        for region in regions {
            self.insert(region).await?;
        }
        Ok(())
    }

    async fn find_all(&self) -> Result<Vec<I18nRegion>> {
        let sql = format!("SELECT {} FROM i18n_region ORDER BY code, hl", REGION_COLUMNS);
        let result = self.conn.query(&sql, &[]).await?;
        result.rows.iter().map(I18nRegion::from_row).collect()
    }

    async fn find_by_code_and_locale(
        &self,
        code: &str,
        locale: &str,
    ) -> Result<Option<I18nRegion>> {
        let sql =
            find_by_code_and_locale_sql("i18n_region", REGION_COLUMNS, self.conn.param_style());
        let result = self
            .conn
            .query(
                &sql,
                &[
                    Value::String(code.to_string()),
                    Value::String(locale.to_string()),
                ],
            )
            .await?;
        result.rows.first().map(I18nRegion::from_row).transpose()
    }

    async fn find_all_for_locale(&self, locale: &str) -> Result<Vec<I18nRegion>> {
        let sql = find_all_for_locale_sql("i18n_region", REGION_COLUMNS, self.conn.param_style());
        let result = self
            .conn
            .query(&sql, &[Value::String(locale.to_string())])
            .await?;
        result.rows.iter().map(I18nRegion::from_row).collect()
    }
}
