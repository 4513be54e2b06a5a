//! Crema - a synced price-list manager for a coffee retailer.
//!
//! Loads the catalog from the local store, optionally mirrors it to the
//! shared remote store, and keeps applying remote notifications until
//! interrupted.

use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crema_client::{Config, LocalStore, RemoteBackend, SyncedCatalog};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "crema=debug,crema_client=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing::info!(data_dir = %config.data_dir.display(), "starting Crema");

    let store = LocalStore::open(&config.data_dir)?;
    let mut app = SyncedCatalog::open(store);

    tracing::info!(
        products = app.catalog().products().len(),
        categories = app.catalog().categories().len(),
        "catalog loaded"
    );

    // Environment credentials win over the persisted ones
    let remote = config.remote.clone().or_else(|| app.remote_config().cloned());
    if let Some(remote) = remote {
        let backend = RemoteBackend::new();
        match app.configure_remote(&backend, remote).await {
            Ok(()) => tracing::info!("remote sync enabled"),
            Err(e) => tracing::warn!(error = %e, "remote sync unavailable"),
        }
    } else {
        tracing::info!("no remote configured; changes stay on this device");
    }

    let mut poll = tokio::time::interval(Duration::from_millis(500));
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            _ = poll.tick() => {
                if let Err(e) = app.pump_remote() {
                    tracing::warn!(error = %e, "failed to apply remote update");
                }
            }
        }
    }

    app.disconnect();
    tracing::info!("shut down");

    Ok(())
}
