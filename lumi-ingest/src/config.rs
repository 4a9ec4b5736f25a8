//! Configuration resolution for lumi-ingest
//!
//! The analysis API key is resolved Database → ENV → TOML, with a warning
//! when more than one source carries a key.

use lumi_common::config::TomlConfig;
use lumi_common::Result;
use sqlx::{Pool, Sqlite};
use tracing::{info, warn};

/// Environment variable carrying the analysis API key
pub const ANALYSIS_API_KEY_ENV: &str = "LUMI_ANALYSIS_API_KEY";

/// Resolve the analysis API key. `None` when no source has one; the
/// analysis service is then called without credentials.
pub async fn resolve_analysis_api_key(
    db: &Pool<Sqlite>,
    toml_config: &TomlConfig,
) -> Result<Option<String>> {
    let db_key = crate::db::settings::get_analysis_api_key(db)
        .await?
        .filter(|k| is_valid_key(k));
    let env_key = std::env::var(ANALYSIS_API_KEY_ENV)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .analysis
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    let sources: Vec<&str> = [
        ("database", db_key.is_some()),
        ("environment", env_key.is_some()),
        ("TOML", toml_key.is_some()),
    ]
    .into_iter()
    .filter_map(|(name, present)| present.then_some(name))
    .collect();

    if sources.len() > 1 {
        warn!(
            "Analysis API key found in multiple sources: {}. Using {} (highest priority).",
            sources.join(", "),
            sources[0]
        );
    }

    match sources.first() {
        Some(source) => info!("Analysis API key loaded from {}", source),
        None => info!("No analysis API key configured"),
    }

    Ok(db_key.or(env_key).or(toml_key))
}

/// Non-empty after trimming
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}
