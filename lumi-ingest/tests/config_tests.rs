//! Analysis API key resolution (Database → ENV → TOML)
//!
//! Tests touching LUMI_ANALYSIS_API_KEY are #[serial].

use lumi_common::config::TomlConfig;
use lumi_ingest::config::{resolve_analysis_api_key, ANALYSIS_API_KEY_ENV};
use lumi_ingest::db::{self, settings};
use serial_test::serial;
use std::env;

fn toml_with_key(key: Option<&str>) -> TomlConfig {
    let mut config = TomlConfig::default();
    config.analysis.api_key = key.map(str::to_string);
    config
}

#[tokio::test]
#[serial]
async fn test_database_key_wins() {
    let pool = db::init_memory_pool().await.unwrap();
    settings::set_analysis_api_key(&pool, "db-key".to_string())
        .await
        .unwrap();
    env::set_var(ANALYSIS_API_KEY_ENV, "env-key");

    let key = resolve_analysis_api_key(&pool, &toml_with_key(Some("toml-key"))).await;
    env::remove_var(ANALYSIS_API_KEY_ENV);

    assert_eq!(key.unwrap().as_deref(), Some("db-key"));
}

#[tokio::test]
#[serial]
async fn test_env_key_wins_over_toml() {
    let pool = db::init_memory_pool().await.unwrap();
    env::set_var(ANALYSIS_API_KEY_ENV, "env-key");

    let key = resolve_analysis_api_key(&pool, &toml_with_key(Some("toml-key"))).await;
    env::remove_var(ANALYSIS_API_KEY_ENV);

    assert_eq!(key.unwrap().as_deref(), Some("env-key"));
}

#[tokio::test]
#[serial]
async fn test_blank_values_are_ignored() {
    let pool = db::init_memory_pool().await.unwrap();
    settings::set_analysis_api_key(&pool, "   ".to_string())
        .await
        .unwrap();
    env::set_var(ANALYSIS_API_KEY_ENV, "");

    let key = resolve_analysis_api_key(&pool, &toml_with_key(Some("toml-key"))).await;
    env::remove_var(ANALYSIS_API_KEY_ENV);

    assert_eq!(key.unwrap().as_deref(), Some("toml-key"));
}

#[tokio::test]
#[serial]
async fn test_no_key_anywhere() {
    env::remove_var(ANALYSIS_API_KEY_ENV);
    let pool = db::init_memory_pool().await.unwrap();

    let key = resolve_analysis_api_key(&pool, &toml_with_key(None)).await;
    assert!(key.unwrap().is_none());
}
