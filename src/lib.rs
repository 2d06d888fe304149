pub mod commands;
pub mod config;
pub mod db;
pub mod error;
pub mod http;
pub mod models;
pub mod notifier;
pub mod order_code;
pub mod validation;
pub mod watcher;


use std::sync::Arc;

use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use commands::users;
use config::{Config, LOG_ENV_VAR};
use db::Database;
use http::AppState;
use watcher::StockWatcher;

/// Initialize tracing from `STOREFRONT_LOG`, defaulting to "info".
pub fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV_VAR)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Open the database, wire the notifier and serve the API.
pub async fn run(config: Config) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let db = Arc::new(Database::open(&config.database.path)?);
    db.initialize()?;
    info!(path = %config.database.path, "database ready");

    if let Some(admin) = &config.admin {
        users::ensure_admin(&db, &admin.name, &admin.email)?;
    }

    let notifier = notifier::from_config(&config.mail)?;
    let watcher = StockWatcher::new(
        db.clone(),
        notifier,
        config.storefront.clone(),
        config.alerts.batch_size,
    );

    http::serve(AppState { db, watcher }, &config.bind_address()).await?;
    Ok(())
}
