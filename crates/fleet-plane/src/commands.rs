use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use fleet_config::{AppConfig, ConfigResolver, NullVault};
use fleet_plane::CommandRegistry;
use fleet_store::{default_backup_strategy, ConnectionManager, HealthMonitor, MigrationEngine, RevisionGraph};
use tracing::info;

use crate::cli::MigrateAction;

async fn load_config(config_dir: &PathBuf, environment: &str) -> Result<AppConfig> {
    let resolver = ConfigResolver::new(config_dir.clone(), environment.to_string());
    let config = resolver
        .load_with_secrets(&NullVault)
        .await
        .context("failed to resolve configuration")?;
    Ok(config)
}

fn plugins_directory(config: &AppConfig, override_dir: Option<PathBuf>) -> PathBuf {
    override_dir.unwrap_or_else(|| PathBuf::from(&config.plugins.directory))
}

pub async fn serve(config_dir: PathBuf, environment: String, plugins_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_dir, &environment).await?;

    let manager = ConnectionManager::new(config.database.clone());
    manager.initialize().await.context("failed to connect to the database")?;
    manager.test_connection_with_retry().await.context("database not reachable")?;

    let monitor = HealthMonitor::new(manager.clone(), Duration::from_secs(config.database.health_check_interval_secs), Duration::from_secs(config.database.health_check_timeout_secs));
    tokio::spawn(monitor.clone().run());

    let directory = plugins_directory(&config, plugins_dir);
    let registry = CommandRegistry::new(
        directory,
        Duration::from_secs(config.plugins.load_timeout_secs),
        config.plugins.max_load_retries,
    );
    let results = registry.load_all().await;
    for result in &results {
        info!(module = %result.module_name, state = ?result.state, "module load result");
    }

    if config.plugins.auto_reload {
        registry.watch(Duration::from_secs_f64(config.plugins.reload_delay_secs))?;
    }

    info!("command plane serving, press ctrl-c to stop");
    tokio::signal::ctrl_c().await.context("failed to listen for shutdown signal")?;
    manager.shutdown().await;
    Ok(())
}

pub async fn run(
    config_dir: PathBuf,
    environment: String,
    command: String,
    args: String,
    plugins_dir: Option<PathBuf>,
) -> Result<()> {
    let config = load_config(&config_dir, &environment).await?;
    let directory = plugins_directory(&config, plugins_dir);
    let registry = CommandRegistry::new(
        directory,
        Duration::from_secs(config.plugins.load_timeout_secs),
        config.plugins.max_load_retries,
    );
    registry.load_all().await;

    let args: serde_json::Value = serde_json::from_str(&args).context("--args must be valid JSON")?;
    let output = registry.dispatch(&command, args).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

pub async fn list_commands(config_dir: PathBuf, environment: String, plugins_dir: Option<PathBuf>) -> Result<()> {
    let config = load_config(&config_dir, &environment).await?;
    let directory = plugins_directory(&config, plugins_dir);
    let registry = CommandRegistry::new(
        directory,
        Duration::from_secs(config.plugins.load_timeout_secs),
        config.plugins.max_load_retries,
    );
    registry.load_all().await;

    for (module, command) in registry.list_commands().await {
        println!("{module}\t{command}");
    }
    Ok(())
}

pub async fn migrate(
    config_dir: PathBuf,
    environment: String,
    action: MigrateAction,
    migrations_dir: PathBuf,
) -> Result<()> {
    let config = load_config(&config_dir, &environment).await?;
    let manager = ConnectionManager::new(config.database.clone());
    manager.initialize().await.context("failed to connect to the database")?;

    let (kind, url) = manager.info().await?;
    let graph = RevisionGraph::load(&migrations_dir).context("failed to load migration revisions")?;
    let backup = default_backup_strategy(kind, &url, migrations_dir.join("backups"));
    let engine = MigrationEngine::new(manager.clone(), graph, backup);
    engine.ensure_bookkeeping_table().await?;

    match action {
        MigrateAction::Up { target } => {
            let applied = engine.upgrade(target.as_deref()).await?;
            for revision in applied {
                println!("applied {revision}");
            }
        }
        MigrateAction::Down { target } => {
            let target = target.ok_or_else(|| anyhow::anyhow!("--target is required for downgrade"))?;
            let rolled_back = engine.downgrade(&target).await?;
            for revision in rolled_back {
                println!("rolled back {revision}");
            }
        }
    }

    manager.shutdown().await;
    Ok(())
}

pub async fn status(config_dir: PathBuf, environment: String) -> Result<()> {
    let config = load_config(&config_dir, &environment).await?;
    let manager = ConnectionManager::new(config.database.clone());
    manager.initialize().await.context("failed to connect to the database")?;

    let monitor = HealthMonitor::new(manager.clone(), Duration::from_secs(config.database.health_check_interval_secs), Duration::from_secs(config.database.health_check_timeout_secs));
    let state = monitor.force_check().await;
    let metrics = monitor.metrics().await;
    let stats = manager.statistics().await;

    println!("state: {state:?}");
    println!("consecutive_failures: {}", metrics.consecutive_failures);
    println!("window_success_rate: {:.2}", metrics.window_success_rate);
    println!("p95_latency_ms: {}", metrics.p95_latency_ms);
    println!("checkouts: {} (failures: {})", stats.checkout_count, stats.checkout_failures);

    manager.shutdown().await;
    Ok(())
}
