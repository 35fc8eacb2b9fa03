//! API server entry point.

use std::sync::Arc;

use api::config::Config;
use api::error::StartupError;
use order_saga::{CartClient, HttpCartClient, HttpInventoryClient, InventoryClient};
use order_store::{OrderStore, PostgresOrderStore};
use tokio::signal;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Waits for a shutdown signal (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install SIGINT handler");
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
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("received SIGINT, starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("received SIGTERM, starting graceful shutdown");
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), StartupError> {
    let config = Config::from_env();

    // 1. Initialize tracing
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.log_level)),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // 2. Install Prometheus metrics recorder
    let metrics_handle = metrics_exporter_prometheus::PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| StartupError::Metrics(e.to_string()))?;

    // 3. Wire collaborators: configured remotes, otherwise in-memory demo services
    let demo = api::DemoServices::seeded();

    let store: Arc<dyn OrderStore> = match &config.database_url {
        Some(url) => {
            let store = PostgresOrderStore::connect(url, 10).await?;
            store
                .run_migrations()
                .await
                .map_err(order_store::OrderStoreError::from)?;
            tracing::info!("using PostgreSQL order store");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, orders are kept in memory");
            Arc::new(demo.store.clone())
        }
    };

    let inventory: Arc<dyn InventoryClient> = match &config.inventory_url {
        Some(url) => Arc::new(HttpInventoryClient::new(url.as_str(), config.call_timeout())?),
        None => {
            tracing::warn!("INVENTORY_URL not set, using in-memory demo inventory");
            Arc::new(demo.inventory.clone())
        }
    };

    let cart: Arc<dyn CartClient> = match &config.cart_url {
        Some(url) => Arc::new(HttpCartClient::new(url.as_str(), config.call_timeout())?),
        None => {
            tracing::warn!("CART_URL not set, using in-memory demo cart");
            Arc::new(demo.cart.clone())
        }
    };

    let state = api::build_state(&config, store, inventory, cart)?;

    // 4. Build the application
    let app = api::create_app(state, metrics_handle);

    // 5. Start server
    let addr = config.addr();
    tracing::info!(%addr, worker_id = config.worker_id, "starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("server shut down gracefully");
    Ok(())
}
