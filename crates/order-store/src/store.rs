use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use common::OrderId;
use domain::{OrderHeader, OrderLineItem, OrderStatus};

use crate::{OrderStoreError, Result};

/// Outcome of a conditional status update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusUpdate {
    /// The order was in the expected status and now has the new one.
    Applied,
    /// The order was in some other status; nothing changed.
    Unchanged { current: OrderStatus },
}

impl StatusUpdate {
    /// Returns true if the update changed the stored status.
    pub fn is_applied(&self) -> bool {
        matches!(self, StatusUpdate::Applied)
    }
}

/// Core trait for order store implementations.
///
/// All implementations must be thread-safe (Send + Sync). Line items have no
/// update operation: once written they only change by being read.
#[async_trait]
pub trait OrderStore: Send + Sync {
    /// Persists a header and all of its items atomically.
    ///
    /// Either every row is written or none is. Returns the stored header.
    async fn create_order_atomic(
        &self,
        header: OrderHeader,
        items: Vec<OrderLineItem>,
    ) -> Result<OrderHeader>;

    /// Retrieves an order header. Returns None if the order doesn't exist.
    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderHeader>>;

    /// Retrieves the line items of an order, ordered by variant id.
    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>>;

    /// Moves the order from `expected` to `new` only if it is currently in `expected`.
    ///
    /// Fails with `OrderNotFound` if the order doesn't exist and with
    /// `InvalidTransition` if `expected ──► new` is not a legal edge.
    async fn update_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<StatusUpdate>;
}

#[async_trait]
impl<T: OrderStore + ?Sized> OrderStore for Arc<T> {
    async fn create_order_atomic(
        &self,
        header: OrderHeader,
        items: Vec<OrderLineItem>,
    ) -> Result<OrderHeader> {
        (**self).create_order_atomic(header, items).await
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderHeader>> {
        (**self).get_order(order_id).await
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        (**self).get_order_items(order_id).await
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<StatusUpdate> {
        (**self).update_status(order_id, expected, new).await
    }
}

/// Validates a header and its items before they are written.
pub fn validate_order_for_create(header: &OrderHeader, items: &[OrderLineItem]) -> Result<()> {
    let invalid = |reason: &str| OrderStoreError::InvalidOrder {
        order_id: header.order_id,
        reason: reason.to_string(),
    };

    if items.is_empty() {
        return Err(invalid("order has no line items"));
    }
    if header.status != OrderStatus::AwaitingPayment {
        return Err(invalid("new orders must start in AwaitingPayment"));
    }
    if items.iter().any(|i| i.order_id != header.order_id) {
        return Err(invalid("line item belongs to a different order"));
    }

    let mut seen = HashSet::with_capacity(items.len());
    if !items.iter().all(|i| seen.insert(i.variant_id)) {
        return Err(invalid("duplicate variant in line items"));
    }

    if !header.matches_items(items) {
        return Err(invalid("total amount does not equal sum of subtotals"));
    }
    if header.total_amount.checked_add(header.shipping_fee) != Some(header.payment_amount) {
        return Err(invalid("payment amount does not equal total plus shipping fee"));
    }

    Ok(())
}

/// Checks that `expected ──► new` is a legal edge before touching storage.
pub fn validate_transition(
    order_id: OrderId,
    expected: OrderStatus,
    new: OrderStatus,
) -> Result<()> {
    if expected.can_transition_to(new) {
        Ok(())
    } else {
        Err(OrderStoreError::InvalidTransition {
            order_id,
            from: expected,
            to: new,
        })
    }
}
