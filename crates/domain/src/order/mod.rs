//! Order model and related types.

mod commands;
mod model;
mod state;
mod value_objects;

pub use commands::{OrderRequestItem, PlaceOrder};
pub use model::{OrderCharges, OrderDraft, OrderHeader, OrderLineItem, PricedLine, SkuSnapshot};
pub use state::OrderStatus;
pub use value_objects::{Money, ShippingAddress};

use common::VariantId;
use thiserror::Error;

/// Errors raised while building or validating orders.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum OrderError {
    /// The request contained no items.
    #[error("Order must contain at least one item")]
    EmptyItemList,

    /// A requested quantity was zero.
    #[error("Invalid quantity {quantity} for variant {variant_id} (must be greater than 0)")]
    InvalidQuantity { variant_id: VariantId, quantity: u32 },

    /// Price times quantity, or the order total, overflowed.
    #[error("Order amount overflows for variant {variant_id}")]
    AmountOverflow { variant_id: VariantId },

    /// Adding the shipping fee to the order total overflowed.
    #[error("Order payment amount overflows")]
    TotalOverflow,

    /// A negative unit price came back from pricing.
    #[error("Invalid unit price {price} for variant {variant_id}")]
    InvalidPrice { variant_id: VariantId, price: i64 },

    /// A stored status code does not map to a known status.
    #[error("Unknown order status code: {0}")]
    UnknownStatus(i16),
}
