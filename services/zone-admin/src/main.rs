mod cli;
mod commands;

use clap::Parser;
use std::sync::Arc;
use zone_config::ServiceConfig;
use zone_observability::{init, log_startup, ObservabilityConfig};
use zone_storage::{ListenerRegistry, NoopZoneInitializer};
use zone_storage_sqlite::{SqliteConfig, SqliteZoneStore};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let config = ServiceConfig::from_env("zone-admin");
    let handle = init(&ObservabilityConfig::from_service(&config));
    log_startup(&handle);

    let mut store_config = SqliteConfig::from_env(&config.default_database_url());
    if let Some(database) = args.database {
        store_config.database_url = database;
    }

    let listeners = Arc::new(ListenerRegistry::new());
    listeners.add(Arc::new(|| tracing::info!("Zone geometry changed")));
    let store =
        SqliteZoneStore::connect_with(&store_config, listeners, Arc::new(NoopZoneInitializer))
            .await?;

    let output = commands::run(&store, args.command).await?;
    if !output.is_null() {
        println!("{}", serde_json::to_string_pretty(&output)?);
    }
    store.pool().close().await;
    Ok(())
}
