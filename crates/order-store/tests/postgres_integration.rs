//! PostgreSQL integration tests
//!
//! These tests use a shared PostgreSQL container for efficiency.
//! Run with:
//!
//! ```bash
//! cargo test -p order-store --test postgres_integration -- --test-threads=1
//! ```

use std::sync::Arc;

use chrono::Utc;
use common::{OrderId, ProductId, UserId, VariantId};
use domain::{
    Money, OrderDraft, OrderHeader, OrderLineItem, OrderStatus, PricedLine, ShippingAddress,
    SkuSnapshot,
};
use order_store::{OrderStore, OrderStoreError, PostgresOrderStore, StatusUpdate};
use sqlx::PgPool;
use testcontainers::{ContainerAsync, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

/// Shared container info - container stays alive for all tests
struct ContainerInfo {
    #[allow(dead_code)] // Container must stay alive for tests
    container: ContainerAsync<Postgres>,
    connection_string: String,
}

/// Global shared container
static CONTAINER: OnceCell<Arc<ContainerInfo>> = OnceCell::const_new();

async fn get_container_info() -> Arc<ContainerInfo> {
    CONTAINER
        .get_or_init(|| async {
            let container = Postgres::default().start().await.unwrap();

            let host = container.get_host().await.unwrap();
            let port = container.get_host_port_ipv4(5432).await.unwrap();

            let connection_string =
                format!("postgres://postgres:postgres@{}:{}/postgres", host, port);

            let temp_pool = PgPool::connect(&connection_string).await.unwrap();
            sqlx::raw_sql(include_str!(
                "../../../migrations/001_create_orders_tables.sql"
            ))
            .execute(&temp_pool)
            .await
            .unwrap();
            temp_pool.close().await;

            Arc::new(ContainerInfo {
                container,
                connection_string,
            })
        })
        .await
        .clone()
}

/// Get a fresh store with its own pool and cleared tables
async fn get_test_store() -> PostgresOrderStore {
    let info = get_container_info().await;

    let pool = sqlx::postgres::PgPoolOptions::new()
        .max_connections(5)
        .connect(&info.connection_string)
        .await
        .unwrap();

    sqlx::query("TRUNCATE TABLE order_items, orders")
        .execute(&pool)
        .await
        .unwrap();

    PostgresOrderStore::new(pool)
}

fn address() -> ShippingAddress {
    ShippingAddress {
        receiver_name: "Han Meimei".to_string(),
        phone: "13900000000".to_string(),
        province: "Guangdong".to_string(),
        city: "Shenzhen".to_string(),
        district: "Nanshan".to_string(),
        detail: "8 Keyuan Road".to_string(),
        postal_code: Some("518057".to_string()),
    }
}

fn create_test_order(
    order_id: u64,
    lines: &[(u64, i64, u32)],
) -> (OrderHeader, Vec<OrderLineItem>) {
    let lines = lines
        .iter()
        .map(|&(variant, price, quantity)| {
            let snapshot = SkuSnapshot {
                variant_id: VariantId::new(variant),
                product_id: ProductId::new(variant / 1000),
                unit_price: Money::from_minor(price),
                available_stock: 1_000,
                title: format!("Variant {variant}"),
                image_url: format!("https://img.example.com/{variant}.png"),
            };
            PricedLine::new(&snapshot, quantity).unwrap()
        })
        .collect();

    let draft = OrderDraft::new(UserId::new(42), lines, address()).unwrap();
    let charges = draft.charges(Money::from_minor(800)).unwrap();
    draft.into_order(OrderId::new(order_id), charges, Utc::now())
}

#[tokio::test]
async fn create_and_load_order() {
    let store = get_test_store().await;
    let (header, items) = create_test_order(1, &[(1001, 899_900, 2), (2002, 1_500, 3)]);

    store
        .create_order_atomic(header.clone(), items.clone())
        .await
        .unwrap();

    let loaded = store.get_order(header.order_id).await.unwrap().unwrap();
    assert_eq!(loaded.order_id, header.order_id);
    assert_eq!(loaded.user_id, UserId::new(42));
    assert_eq!(loaded.total_amount, Money::from_minor(1_799_800 + 4_500));
    assert_eq!(loaded.payment_amount, Money::from_minor(1_799_800 + 4_500 + 800));
    assert_eq!(loaded.status, OrderStatus::AwaitingPayment);
    assert_eq!(loaded.shipping_address, address());

    let loaded_items = store.get_order_items(header.order_id).await.unwrap();
    assert_eq!(loaded_items, items);
    assert!(loaded.matches_items(&loaded_items));
}

#[tokio::test]
async fn missing_order_returns_none() {
    let store = get_test_store().await;
    assert!(store.get_order(OrderId::new(404)).await.unwrap().is_none());
    assert!(store.get_order_items(OrderId::new(404)).await.unwrap().is_empty());
}

#[tokio::test]
async fn duplicate_order_id_is_rejected_without_partial_rows() {
    let store = get_test_store().await;
    let (header, items) = create_test_order(7, &[(1001, 100, 1)]);
    store
        .create_order_atomic(header.clone(), items)
        .await
        .unwrap();

    let (mut other, other_items) = create_test_order(7, &[(3003, 200, 1)]);
    other.user_id = UserId::new(43);
    let result = store.create_order_atomic(other, other_items).await;
    assert!(matches!(result, Err(OrderStoreError::DuplicateOrder(_))));

    let items = store.get_order_items(header.order_id).await.unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0].variant_id, VariantId::new(1001));
}

#[tokio::test]
async fn failing_item_insert_rolls_back_header() {
    let store = get_test_store().await;
    let (header, mut items) = create_test_order(9, &[(1001, 100, 1)]);
    // Title with a NUL byte is rejected by Postgres after the header insert.
    items[0].title = "bad\0title".to_string();

    let result = store.create_order_atomic(header.clone(), items).await;
    assert!(result.is_err());
    assert!(store.get_order(header.order_id).await.unwrap().is_none());
}

#[tokio::test]
async fn conditional_status_update_is_idempotent() {
    let store = get_test_store().await;
    let (header, items) = create_test_order(11, &[(1001, 100, 1)]);
    let order_id = header.order_id;
    store.create_order_atomic(header, items).await.unwrap();

    let first = store
        .update_status(order_id, OrderStatus::AwaitingPayment, OrderStatus::AwaitingShipment)
        .await
        .unwrap();
    assert_eq!(first, StatusUpdate::Applied);

    let second = store
        .update_status(order_id, OrderStatus::AwaitingPayment, OrderStatus::AwaitingShipment)
        .await
        .unwrap();
    assert_eq!(
        second,
        StatusUpdate::Unchanged {
            current: OrderStatus::AwaitingShipment
        }
    );

    let loaded = store.get_order(order_id).await.unwrap().unwrap();
    assert_eq!(loaded.status, OrderStatus::AwaitingShipment);
    assert!(loaded.updated_at >= loaded.created_at);
}

#[tokio::test]
async fn concurrent_confirmations_apply_exactly_once() {
    let store = get_test_store().await;
    let (header, items) = create_test_order(13, &[(1001, 100, 1)]);
    let order_id = header.order_id;
    store.create_order_atomic(header, items).await.unwrap();

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let store = store.clone();
            tokio::spawn(async move {
                store
                    .update_status(
                        order_id,
                        OrderStatus::AwaitingPayment,
                        OrderStatus::AwaitingShipment,
                    )
                    .await
                    .unwrap()
            })
        })
        .collect();

    let mut applied = 0;
    for handle in handles {
        if handle.await.unwrap().is_applied() {
            applied += 1;
        }
    }
    assert_eq!(applied, 1);
}

#[tokio::test]
async fn update_status_of_unknown_order_fails() {
    let store = get_test_store().await;
    let result = store
        .update_status(
            OrderId::new(999),
            OrderStatus::AwaitingPayment,
            OrderStatus::AwaitingShipment,
        )
        .await;
    assert!(matches!(result, Err(OrderStoreError::OrderNotFound(_))));
}
