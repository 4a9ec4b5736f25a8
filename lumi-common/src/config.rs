//! Configuration loading and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable (`LUMI_ROOT_FOLDER`)
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)
//!
//! A missing or malformed TOML file never stops startup: a warning is logged
//! and defaults are used.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "LUMI_ROOT_FOLDER";

/// Default HTTP port of lumi-ingest
pub const DEFAULT_PORT: u16 = 5810;

/// Logging section
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// EnvFilter directive used when `RUST_LOG` is unset
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "lumi_ingest=info,lumi_common=info,tower_http=info".to_string(),
        }
    }
}

/// External analysis service
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub url: Option<String>,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            url: None,
            api_key: None,
            timeout_secs: 60,
        }
    }
}

/// Entitlement source
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EntitlementConfig {
    pub url: Option<String>,
    pub timeout_secs: u64,
    /// Grant every signed-in owner. Development only; ignored when `url` is set.
    pub dev_grant_all: bool,
}

impl Default for EntitlementConfig {
    fn default() -> Self {
        Self {
            url: None,
            timeout_secs: 10,
            dev_grant_all: false,
        }
    }
}

/// Downstream plan generation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub url: Option<String>,
}

/// Object storage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Base URL under which `/objects/...` is reachable by the analysis service
    pub public_base_url: String,
    /// Secret used to sign read access references
    pub signing_secret: Option<String>,
    /// Lifetime of read access references
    pub read_access_ttl_secs: u64,
    /// Bound on issuing read access references
    pub issue_timeout_secs: u64,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            public_base_url: format!("http://127.0.0.1:{}", DEFAULT_PORT),
            signing_secret: None,
            read_access_ttl_secs: 3600,
            issue_timeout_secs: 10,
        }
    }
}

/// Local staging store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StagingConfig {
    pub quota_bytes: u64,
}

impl Default for StagingConfig {
    fn default() -> Self {
        Self {
            quota_bytes: 32 * 1024 * 1024,
        }
    }
}

/// Contents of `lumi-ingest.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub port: Option<u16>,
    pub logging: LoggingConfig,
    pub analysis: AnalysisConfig,
    pub entitlement: EntitlementConfig,
    pub plan: PlanConfig,
    pub storage: StorageConfig,
    pub staging: StagingConfig,
}

/// Read a TOML config file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML failed: {}", e)))?;
    toml::from_str(&content).map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))
}

/// Read a TOML config file, falling back to defaults with a warning
pub fn load_toml_config_or_default(path: &Path) -> TomlConfig {
    if !path.exists() {
        warn!(
            "Config file {} not found, using defaults",
            path.display()
        );
        return TomlConfig::default();
    }
    match load_toml_config(path) {
        Ok(config) => {
            debug!("Loaded config from {}", path.display());
            config
        }
        Err(e) => {
            warn!("{} ({}), using defaults", e, path.display());
            TomlConfig::default()
        }
    }
}

/// Write a TOML config file atomically (temp file + rename)
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    let temp_path = path.with_extension("toml.tmp");
    std::fs::write(&temp_path, content)?;
    std::fs::rename(&temp_path, path)?;
    Ok(())
}

/// Default config file location: `<config_dir>/lumi/<service>.toml`
pub fn default_config_path(service_name: &str) -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("lumi").join(format!("{}.toml", service_name)))
}

/// Resolves the root folder following the priority order above
#[derive(Debug, Clone)]
pub struct RootFolderResolver {
    service_name: String,
    cli_arg: Option<PathBuf>,
    toml_root: Option<PathBuf>,
}

impl RootFolderResolver {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            cli_arg: None,
            toml_root: None,
        }
    }

    pub fn with_cli_arg(mut self, cli_arg: Option<PathBuf>) -> Self {
        self.cli_arg = cli_arg;
        self
    }

    pub fn with_toml_config(mut self, config: &TomlConfig) -> Self {
        self.toml_root = config.root_folder.clone();
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = &self.cli_arg {
            return path.clone();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = &self.toml_root {
            return path.clone();
        }

        default_root_folder(&self.service_name)
    }
}

/// OS-dependent default root folder
fn default_root_folder(service_name: &str) -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("lumi").join(service_name))
        .unwrap_or_else(|| PathBuf::from("./lumi_data").join(service_name))
}

/// Creates the root folder and names the files inside it
#[derive(Debug, Clone)]
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    pub fn ensure_directory_exists(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root_folder)?;
        std::fs::create_dir_all(self.staging_path())?;
        std::fs::create_dir_all(self.objects_path())?;
        Ok(())
    }

    pub fn root_folder(&self) -> &Path {
        &self.root_folder
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join("lumi.db")
    }

    pub fn staging_path(&self) -> PathBuf {
        self.root_folder.join("staging")
    }

    pub fn objects_path(&self) -> PathBuf {
        self.root_folder.join("objects")
    }
}
