use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{OrderId, ProductId, UserId, VariantId};
use domain::{Money, OrderHeader, OrderLineItem, OrderStatus, ShippingAddress};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};

use crate::store::{OrderStore, StatusUpdate, validate_order_for_create, validate_transition};
use crate::{OrderStoreError, Result};

/// PostgreSQL-backed order store implementation.
#[derive(Clone)]
pub struct PostgresOrderStore {
    pool: PgPool,
}

impl PostgresOrderStore {
    /// Creates a new PostgreSQL order store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Connects to `database_url` with a pool of up to `max_connections`.
    pub async fn connect(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self::new(pool))
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    fn row_to_header(row: PgRow) -> Result<OrderHeader> {
        let address: serde_json::Value = row.try_get("shipping_address")?;
        let shipping_address: ShippingAddress = serde_json::from_value(address)?;

        Ok(OrderHeader {
            order_id: OrderId::new(from_i64("order_id", row.try_get("order_id")?)?),
            user_id: UserId::new(from_i64("user_id", row.try_get("user_id")?)?),
            total_amount: Money::from_minor(row.try_get("total_amount")?),
            shipping_fee: Money::from_minor(row.try_get("shipping_fee")?),
            payment_amount: Money::from_minor(row.try_get("payment_amount")?),
            status: OrderStatus::from_code(row.try_get("status")?)?,
            shipping_address,
            created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
            updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
        })
    }

    fn row_to_item(row: PgRow) -> Result<OrderLineItem> {
        let quantity: i32 = row.try_get("quantity")?;
        let quantity = u32::try_from(quantity).map_err(|_| OrderStoreError::OutOfRange {
            field: "quantity",
            value: quantity.to_string(),
        })?;

        Ok(OrderLineItem::new(
            OrderId::new(from_i64("order_id", row.try_get("order_id")?)?),
            VariantId::new(from_i64("variant_id", row.try_get("variant_id")?)?),
            ProductId::new(from_i64("product_id", row.try_get("product_id")?)?),
            row.try_get::<String, _>("title")?,
            row.try_get::<String, _>("image_url")?,
            Money::from_minor(row.try_get("unit_price")?),
            quantity,
        )?)
    }
}

#[async_trait]
impl OrderStore for PostgresOrderStore {
    async fn create_order_atomic(
        &self,
        header: OrderHeader,
        items: Vec<OrderLineItem>,
    ) -> Result<OrderHeader> {
        validate_order_for_create(&header, &items)?;

        let order_id = header.order_id;
        let address = serde_json::to_value(&header.shipping_address)?;

        // Header and items share one transaction
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO orders (order_id, user_id, total_amount, shipping_fee, payment_amount, status, shipping_address, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(to_i64("order_id", order_id.get())?)
        .bind(to_i64("user_id", header.user_id.get())?)
        .bind(header.total_amount.minor())
        .bind(header.shipping_fee.minor())
        .bind(header.payment_amount.minor())
        .bind(header.status.code())
        .bind(address)
        .bind(header.created_at)
        .bind(header.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.constraint() == Some("orders_pkey")
            {
                return OrderStoreError::DuplicateOrder(order_id);
            }
            OrderStoreError::Database(e)
        })?;

        for item in &items {
            let quantity = i32::try_from(item.quantity).map_err(|_| OrderStoreError::OutOfRange {
                field: "quantity",
                value: item.quantity.to_string(),
            })?;

            sqlx::query(
                r#"
                INSERT INTO order_items (order_id, variant_id, product_id, title, image_url, unit_price, quantity, subtotal)
                VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
                "#,
            )
            .bind(to_i64("order_id", order_id.get())?)
            .bind(to_i64("variant_id", item.variant_id.get())?)
            .bind(to_i64("product_id", item.product_id.get())?)
            .bind(&item.title)
            .bind(&item.image_url)
            .bind(item.unit_price.minor())
            .bind(quantity)
            .bind(item.subtotal().minor())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        tracing::debug!(%order_id, items = items.len(), "order persisted");
        Ok(header)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderHeader>> {
        let row: Option<PgRow> = sqlx::query(
            r#"
            SELECT order_id, user_id, total_amount, shipping_fee, payment_amount, status, shipping_address, created_at, updated_at
            FROM orders
            WHERE order_id = $1
            "#,
        )
        .bind(to_i64("order_id", order_id.get())?)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Self::row_to_header).transpose()
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let rows = sqlx::query(
            r#"
            SELECT order_id, variant_id, product_id, title, image_url, unit_price, quantity
            FROM order_items
            WHERE order_id = $1
            ORDER BY variant_id ASC
            "#,
        )
        .bind(to_i64("order_id", order_id.get())?)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(Self::row_to_item).collect()
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<StatusUpdate> {
        validate_transition(order_id, expected, new)?;
        let id = to_i64("order_id", order_id.get())?;

        let result = sqlx::query(
            r#"
            UPDATE orders
            SET status = $3, updated_at = NOW()
            WHERE order_id = $1 AND status = $2
            "#,
        )
        .bind(id)
        .bind(expected.code())
        .bind(new.code())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(StatusUpdate::Applied);
        }

        let current: Option<i16> =
            sqlx::query_scalar("SELECT status FROM orders WHERE order_id = $1")
                .bind(id)
                .fetch_optional(&self.pool)
                .await?;

        match current {
            Some(code) => Ok(StatusUpdate::Unchanged {
                current: OrderStatus::from_code(code)?,
            }),
            None => Err(OrderStoreError::OrderNotFound(order_id)),
        }
    }
}

fn to_i64(field: &'static str, value: u64) -> Result<i64> {
    i64::try_from(value).map_err(|_| OrderStoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}

fn from_i64(field: &'static str, value: i64) -> Result<u64> {
    u64::try_from(value).map_err(|_| OrderStoreError::OutOfRange {
        field,
        value: value.to_string(),
    })
}
