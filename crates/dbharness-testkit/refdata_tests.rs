//! Reference-data repository round-trips
//!
//! Each test owns one table on one engine so the suite can run in
//! parallel against the shared containers.

use std::sync::Arc;

use anyhow::Result;
use rstest::rstest;

use dbharness_refdata::{
    I18nLanguage, I18nLanguageRepository, I18nRegion, I18nRegionRepository,
    SqlI18nLanguageRepository, SqlI18nRegionRepository,
};

use crate::fixtures::{lock_language_table, lock_region_table, test_connection, TestEngine};

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn language_rows_round_trip(#[case] engine: TestEngine) -> Result<()> {
    let _guard = lock_language_table().await;
    let conn = test_connection(engine).await?;
    let repo = SqlI18nLanguageRepository::new(Arc::clone(&conn));

    repo.delete_all().await?;

    let languages = vec![
        I18nLanguage::new("en", "English", "en"),
        I18nLanguage::new("fr", "French", "en"),
    ];
    repo.insert_all(&languages).await?;

    let all = repo.find_all().await?;
    assert_eq!(all, languages);
    assert!(all.iter().all(|l| l.id.is_some()), "inserts assign keys");

    let found = repo.find_by_code_and_locale("fr", "en").await?;
    let found = found.expect("fr/en should exist");
    assert_eq!(found.name, "French");

    let missing = repo.find_by_code_and_locale("fr", "de").await?;
    assert!(missing.is_none());

    let for_locale = repo.find_all_for_locale("en").await?;
    assert_eq!(for_locale.len(), 2);

    conn.close().await?;
    Ok(())
}

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn region_rows_round_trip(#[case] engine: TestEngine) -> Result<()> {
    let _guard = lock_region_table().await;
    let conn = test_connection(engine).await?;
    let repo = SqlI18nRegionRepository::new(Arc::clone(&conn));

    repo.delete_all().await?;

    let regions = vec![
        I18nRegion::new("US", "United States", "en", "US"),
        I18nRegion::new("US", "États-Unis", "fr", "US"),
    ];
    repo.insert_all(&regions).await?;

    let all = repo.find_all().await?;
    assert_eq!(all, regions);

    let localized = repo.find_by_code_and_locale("US", "fr").await?;
    let localized = localized.expect("US/fr should exist");
    assert_eq!(localized.name, "États-Unis");
    assert_eq!(localized.gl, "US");

    let french_only = repo.find_all_for_locale("fr").await?;
    assert_eq!(french_only.len(), 1);

    let deleted = repo.delete_all().await?;
    assert_eq!(deleted, 2);
    assert!(repo.find_all().await?.is_empty());

    conn.close().await?;
    Ok(())
}

#[rstest]
#[case::postgres(TestEngine::Postgres)]
#[case::mysql(TestEngine::MySql)]
#[tokio::test]
async fn surrogate_keys_increase_per_insert(#[case] engine: TestEngine) -> Result<()> {
    let _guard = lock_language_table().await;
    let conn = test_connection(engine).await?;
    let repo = SqlI18nLanguageRepository::new(Arc::clone(&conn));

    repo.delete_all().await?;
    repo.insert(&I18nLanguage::new("de", "German", "en")).await?;
    repo.insert(&I18nLanguage::new("es", "Spanish", "en")).await?;

    let all = repo.find_all().await?;
    let ids: Vec<_> = all.iter().filter_map(|l| l.id).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids[0] < ids[1], "keys should be assigned in insert order");

    conn.close().await?;
    Ok(())
}
