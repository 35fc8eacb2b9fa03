//! Domain layer for the order service.
//!
//! This crate provides the order model shared by the store and the
//! placement saga:
//! - `OrderHeader` with integer money totals and a status state machine
//! - `OrderLineItem` holding the price/title snapshot taken at order time
//! - `SkuSnapshot` as returned by the inventory service
//! - `PlaceOrder` command with request normalization

pub mod order;

pub use order::{
    Money, OrderCharges, OrderDraft, OrderError, OrderHeader, OrderLineItem, OrderRequestItem,
    OrderStatus, PlaceOrder, PricedLine, ShippingAddress, SkuSnapshot,
};
