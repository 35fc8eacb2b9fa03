use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use common::OrderId;
use domain::{OrderHeader, OrderLineItem, OrderStatus};
use tokio::sync::RwLock;

use crate::store::{OrderStore, StatusUpdate, validate_order_for_create, validate_transition};
use crate::{OrderStoreError, Result};

#[derive(Debug, Default)]
struct InMemoryOrderState {
    orders: HashMap<OrderId, (OrderHeader, Vec<OrderLineItem>)>,
    create_calls: usize,
    fail_on_create: bool,
    fail_on_get: bool,
    create_delay: Option<Duration>,
    commit_delay: Option<Duration>,
}

/// In-memory order store implementation for testing.
///
/// Provides the same interface as the PostgreSQL implementation, plus
/// switches to simulate a failing or slow database.
#[derive(Debug, Clone, Default)]
pub struct InMemoryOrderStore {
    state: Arc<RwLock<InMemoryOrderState>>,
}

impl InMemoryOrderStore {
    /// Creates a new empty in-memory order store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Configures the store to fail every `create_order_atomic` call.
    pub async fn set_fail_on_create(&self, fail: bool) {
        self.state.write().await.fail_on_create = fail;
    }

    /// Makes every `create_order_atomic` call sleep before writing.
    pub async fn set_create_delay(&self, delay: Option<Duration>) {
        self.state.write().await.create_delay = delay;
    }

    /// Makes every `create_order_atomic` call sleep after the order is
    /// written, like a commit whose acknowledgement is lost.
    pub async fn set_commit_delay(&self, delay: Option<Duration>) {
        self.state.write().await.commit_delay = delay;
    }

    /// Configures the store to fail every `get_order` call.
    pub async fn set_fail_on_get(&self, fail: bool) {
        self.state.write().await.fail_on_get = fail;
    }

    /// Returns the number of stored orders.
    pub async fn order_count(&self) -> usize {
        self.state.read().await.orders.len()
    }

    /// Returns the number of stored line items across all orders.
    pub async fn item_count(&self) -> usize {
        self.state
            .read()
            .await
            .orders
            .values()
            .map(|(_, items)| items.len())
            .sum()
    }

    /// Returns how many times `create_order_atomic` was called.
    pub async fn create_calls(&self) -> usize {
        self.state.read().await.create_calls
    }
}

#[async_trait]
impl OrderStore for InMemoryOrderStore {
    async fn create_order_atomic(
        &self,
        header: OrderHeader,
        items: Vec<OrderLineItem>,
    ) -> Result<OrderHeader> {
        let delay = {
            let mut state = self.state.write().await;
            state.create_calls += 1;
            state.create_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        validate_order_for_create(&header, &items)?;

        let mut state = self.state.write().await;
        if state.fail_on_create {
            return Err(OrderStoreError::Unavailable(
                "simulated write failure".to_string(),
            ));
        }
        if state.orders.contains_key(&header.order_id) {
            return Err(OrderStoreError::DuplicateOrder(header.order_id));
        }

        let mut items = items;
        items.sort_by_key(|i| i.variant_id);
        state
            .orders
            .insert(header.order_id, (header.clone(), items));
        let commit_delay = state.commit_delay;
        drop(state);

        if let Some(delay) = commit_delay {
            tokio::time::sleep(delay).await;
        }
        Ok(header)
    }

    async fn get_order(&self, order_id: OrderId) -> Result<Option<OrderHeader>> {
        let state = self.state.read().await;
        if state.fail_on_get {
            return Err(OrderStoreError::Unavailable(
                "simulated read failure".to_string(),
            ));
        }
        Ok(state.orders.get(&order_id).map(|(header, _)| header.clone()))
    }

    async fn get_order_items(&self, order_id: OrderId) -> Result<Vec<OrderLineItem>> {
        let state = self.state.read().await;
        Ok(state
            .orders
            .get(&order_id)
            .map(|(_, items)| items.clone())
            .unwrap_or_default())
    }

    async fn update_status(
        &self,
        order_id: OrderId,
        expected: OrderStatus,
        new: OrderStatus,
    ) -> Result<StatusUpdate> {
        validate_transition(order_id, expected, new)?;

        let mut state = self.state.write().await;
        let (header, _) = state
            .orders
            .get_mut(&order_id)
            .ok_or(OrderStoreError::OrderNotFound(order_id))?;

        if header.status != expected {
            return Ok(StatusUpdate::Unchanged {
                current: header.status,
            });
        }
        header.status = new;
        header.updated_at = Utc::now();
        Ok(StatusUpdate::Applied)
    }
}
