//! lumi-ingest - guest capture ingestion service
//!
//! Stages guest captures on the device and ingests them once the owner is
//! signed in and entitled.

use anyhow::{Context, Result};
use clap::Parser;
use lumi_common::config::{
    default_config_path, load_toml_config, RootFolderInitializer, RootFolderResolver, TomlConfig,
    DEFAULT_PORT,
};
use lumi_common::events::EventBus;
use lumi_ingest::services::{
    AnalysisService, DisabledPlanGenerator, EntitlementGate, EntitlementSource,
    FixedEntitlementSource, HttpAnalysisClient, HttpEntitlementSource, HttpPlanGenerator,
    LocalObjectStorage, PlanGenerator, UnconfiguredAnalysisService,
};
use lumi_ingest::staging::{FsKeyValueStore, StagingStore};
use lumi_ingest::workflow::PipelineSettings;
use lumi_ingest::{db, AppState, Services};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const SERVICE_NAME: &str = "lumi-ingest";

#[derive(Parser, Debug)]
#[command(name = "lumi-ingest")]
#[command(about = "Guest capture ingestion service for Lumi")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "LUMI_INGEST_PORT")]
    port: Option<u16>,

    /// Root folder holding the database, staging area and objects
    #[arg(short, long, env = "LUMI_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// TOML config file
    #[arg(short, long, env = "LUMI_INGEST_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args
        .config
        .clone()
        .or_else(|| default_config_path(SERVICE_NAME));
    let (config, config_warning) = match &config_path {
        Some(path) if path.exists() => match load_toml_config(path) {
            Ok(config) => (config, None),
            Err(e) => (
                TomlConfig::default(),
                Some(format!("{} ({}), using defaults", e, path.display())),
            ),
        },
        _ => (TomlConfig::default(), None),
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Some(warning) = config_warning {
        warn!("{}", warning);
    }

    info!("Starting {} v{}", SERVICE_NAME, env!("CARGO_PKG_VERSION"));

    let root_folder = RootFolderResolver::new(SERVICE_NAME)
        .with_cli_arg(args.root_folder.clone())
        .with_toml_config(&config)
        .resolve();
    let initializer = RootFolderInitializer::new(root_folder);
    initializer
        .ensure_directory_exists()
        .context("Failed to initialize root folder")?;
    info!("Root folder: {}", initializer.root_folder().display());

    let db_path = initializer.database_path();
    let db_pool = db::init_database_pool(&db_path)
        .await
        .with_context(|| format!("Failed to open database {}", db_path.display()))?;
    info!("Database: {}", db_path.display());

    let event_bus = EventBus::new(100);
    let services = build_services(&config, &initializer, &db_pool).await?;
    let state = AppState::assemble(db_pool, event_bus, services);
    let app = lumi_ingest::build_router(state);

    let port = args.port.or(config.port).unwrap_or(DEFAULT_PORT);
    let addr = SocketAddr::from(([127, 0, 0, 1], port));
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;
    info!("Listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn build_services(
    config: &TomlConfig,
    initializer: &RootFolderInitializer,
    db_pool: &sqlx::SqlitePool,
) -> Result<Services> {
    let entitlement_timeout = Duration::from_secs(config.entitlement.timeout_secs);
    let entitlement_source: Arc<dyn EntitlementSource> = match &config.entitlement.url {
        Some(url) => Arc::new(
            HttpEntitlementSource::new(url.clone(), entitlement_timeout)
                .context("Failed to create entitlement client")?,
        ),
        None if config.entitlement.dev_grant_all => {
            warn!("No entitlement source configured; granting every owner (dev_grant_all)");
            Arc::new(FixedEntitlementSource::new(true))
        }
        None => {
            warn!("No entitlement source configured; every flush will be refused");
            Arc::new(FixedEntitlementSource::new(false))
        }
    };
    let gate = EntitlementGate::new(entitlement_source, entitlement_timeout);

    let secret = match &config.storage.signing_secret {
        Some(secret) if !secret.trim().is_empty() => secret.clone(),
        _ => {
            warn!("No storage signing secret configured; using an ephemeral one");
            LocalObjectStorage::ephemeral_secret()
        }
    };
    let objects = Arc::new(LocalObjectStorage::new(
        initializer.objects_path(),
        &config.storage.public_base_url,
        secret,
    ));

    let analysis_timeout = Duration::from_secs(config.analysis.timeout_secs);
    let analysis: Arc<dyn AnalysisService> = match &config.analysis.url {
        Some(url) => {
            let api_key = lumi_ingest::config::resolve_analysis_api_key(db_pool, config).await?;
            Arc::new(
                HttpAnalysisClient::new(url.clone(), api_key, analysis_timeout)
                    .context("Failed to create analysis client")?,
            )
        }
        None => {
            warn!("No analysis service configured; ingestion will fail at the analysis step");
            Arc::new(UnconfiguredAnalysisService)
        }
    };

    let plans: Arc<dyn PlanGenerator> = match &config.plan.url {
        Some(url) => Arc::new(
            HttpPlanGenerator::new(url.clone(), Duration::from_secs(30))
                .context("Failed to create plan client")?,
        ),
        None => Arc::new(DisabledPlanGenerator),
    };

    let max_lock_wait_ms = db::settings::get_db_max_lock_wait_ms(db_pool).await?;
    let scans = Arc::new(db::SqliteScanStore::new(db_pool.clone(), max_lock_wait_ms));

    let staging_backend = FsKeyValueStore::new(initializer.staging_path(), config.staging.quota_bytes)
        .context("Failed to open staging area")?;
    let staging = StagingStore::new(Arc::new(staging_backend));

    Ok(Services {
        gate,
        storage: objects.clone(),
        objects,
        analysis,
        scans,
        plans,
        staging,
        settings: PipelineSettings::from_config(config),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            warn!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!("Failed to install signal handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
