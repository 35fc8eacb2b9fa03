//! HTTP API server for order placement and payment confirmation.
//!
//! Provides REST endpoints for placing orders, reading them back, building
//! payment URLs and receiving gateway notifications, with structured logging
//! (tracing) and Prometheus metrics.

pub mod config;
pub mod error;
pub mod routes;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};
use common::{IdGenerator, ProductId, SnowflakeGenerator, VariantId};
use domain::{Money, SkuSnapshot};
use metrics_exporter_prometheus::PrometheusHandle;
use order_saga::{
    CartClient, HmacPaymentGateway, InMemoryCartService, InMemoryInventoryService,
    InventoryClient, OrderOrchestrator, PaymentAdapter,
};
use order_store::{InMemoryOrderStore, OrderStore};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use config::Config;
use error::StartupError;

/// Orchestrator wired with type-erased collaborators, so the same router
/// serves the in-memory and the production setup.
pub type Orchestrator = OrderOrchestrator<
    Arc<dyn OrderStore>,
    Arc<dyn InventoryClient>,
    Arc<dyn CartClient>,
    Arc<dyn PaymentAdapter>,
>;

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub orchestrator: Orchestrator,
}

/// Creates the Axum application router with all routes and shared state.
pub fn create_app(state: Arc<AppState>, metrics_handle: PrometheusHandle) -> Router {
    let metrics_router = Router::new()
        .route("/metrics", get(routes::metrics::render))
        .with_state(metrics_handle);

    Router::new()
        .route("/health", get(routes::health::check))
        .route("/orders", post(routes::orders::place))
        .route("/orders/{id}", get(routes::orders::get))
        .route("/orders/{id}/payment-url", get(routes::payments::payment_url))
        .route("/payments/notify", post(routes::payments::notify))
        .with_state(state)
        .merge(metrics_router)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
}

/// Builds the application state from configured collaborators.
pub fn build_state(
    config: &Config,
    store: Arc<dyn OrderStore>,
    inventory: Arc<dyn InventoryClient>,
    cart: Arc<dyn CartClient>,
) -> Result<Arc<AppState>, StartupError> {
    let ids: Arc<dyn IdGenerator> =
        Arc::new(SnowflakeGenerator::new(config.worker_id, config.id_epoch_ms)?);
    let payment: Arc<dyn PaymentAdapter> =
        Arc::new(HmacPaymentGateway::new(config.payment_gateway_config()?));

    let orchestrator = OrderOrchestrator::new(store, inventory, cart, payment, ids)
        .with_config(config.orchestrator_config());
    Ok(Arc::new(AppState { orchestrator }))
}

/// In-memory collaborators used when no remote services are configured.
#[derive(Clone, Default)]
pub struct DemoServices {
    pub store: InMemoryOrderStore,
    pub inventory: InMemoryInventoryService,
    pub cart: InMemoryCartService,
}

impl DemoServices {
    /// Creates the demo services with a small seeded catalog.
    pub fn seeded() -> Self {
        let services = Self::default();
        for (variant, product, price, stock, title) in [
            (1001, 1, 899_900, 99, "Phone 256GB Black"),
            (1002, 1, 999_900, 20, "Phone 512GB Black"),
            (2001, 2, 4_900, 500, "Silicone Case"),
        ] {
            services.inventory.upsert_sku(SkuSnapshot {
                variant_id: VariantId::new(variant),
                product_id: ProductId::new(product),
                unit_price: Money::from_minor(price),
                available_stock: stock,
                title: title.to_string(),
                image_url: format!("https://img.example.com/{variant}.png"),
            });
        }
        services
    }
}

/// Creates the application state backed entirely by in-memory services.
pub fn create_default_state(
    config: &Config,
) -> Result<(Arc<AppState>, DemoServices), StartupError> {
    let demo = DemoServices::seeded();
    let state = build_state(
        config,
        Arc::new(demo.store.clone()),
        Arc::new(demo.inventory.clone()),
        Arc::new(demo.cart.clone()),
    )?;
    Ok((state, demo))
}
