use common::OrderId;
use domain::{OrderError, OrderStatus};
use thiserror::Error;

/// Errors that can occur when interacting with the order store.
#[derive(Debug, Error)]
pub enum OrderStoreError {
    /// An order with this id already exists.
    #[error("Order {0} already exists")]
    DuplicateOrder(OrderId),

    /// The order was not found.
    #[error("Order not found: {0}")]
    OrderNotFound(OrderId),

    /// Header and items do not form a consistent order.
    #[error("Invalid order {order_id}: {reason}")]
    InvalidOrder { order_id: OrderId, reason: String },

    /// The requested status change is not an edge of the state machine.
    #[error("Invalid status transition for order {order_id}: {from} -> {to}")]
    InvalidTransition {
        order_id: OrderId,
        from: OrderStatus,
        to: OrderStatus,
    },

    /// A value does not fit the column it is stored in.
    #[error("Value out of range for {field}: {value}")]
    OutOfRange { field: &'static str, value: String },

    /// A stored row could not be mapped back to the order model.
    #[error("Corrupt order row: {0}")]
    Domain(#[from] OrderError),

    /// The in-memory store was told to fail.
    #[error("Order store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type for order store operations.
pub type Result<T> = std::result::Result<T, OrderStoreError>;
