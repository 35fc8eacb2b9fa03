//! Cart service trait and in-memory implementation.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use common::{UserId, VariantId};

use crate::error::ServiceError;

pub(crate) const SERVICE: &str = "cart";

/// Cart operations used after an order is placed.
#[async_trait]
pub trait CartClient: Send + Sync {
    /// Removes the given variants from the user's active cart.
    async fn clear_items(&self, user_id: UserId, ids: &[VariantId]) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: CartClient + ?Sized> CartClient for Arc<T> {
    async fn clear_items(&self, user_id: UserId, ids: &[VariantId]) -> Result<(), ServiceError> {
        (**self).clear_items(user_id, ids).await
    }
}

#[derive(Debug, Default)]
struct InMemoryCartState {
    carts: HashMap<UserId, BTreeSet<VariantId>>,
    clear_calls: usize,
    fail_on_clear: bool,
}

/// In-memory cart service for testing.
#[derive(Debug, Clone, Default)]
pub struct InMemoryCartService {
    state: Arc<RwLock<InMemoryCartState>>,
}

impl InMemoryCartService {
    /// Creates a new in-memory cart service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Puts variants into a user's cart.
    pub fn add_to_cart(&self, user_id: UserId, ids: &[VariantId]) {
        self.state
            .write()
            .unwrap()
            .carts
            .entry(user_id)
            .or_default()
            .extend(ids.iter().copied());
    }

    /// Returns the variants in a user's cart, sorted.
    pub fn cart_items(&self, user_id: UserId) -> Vec<VariantId> {
        self.state
            .read()
            .unwrap()
            .carts
            .get(&user_id)
            .map(|c| c.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Configures the service to fail on clear calls.
    pub fn set_fail_on_clear(&self, fail: bool) {
        self.state.write().unwrap().fail_on_clear = fail;
    }

    /// Returns how many clear calls were made.
    pub fn clear_calls(&self) -> usize {
        self.state.read().unwrap().clear_calls
    }
}

#[async_trait]
impl CartClient for InMemoryCartService {
    async fn clear_items(&self, user_id: UserId, ids: &[VariantId]) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        state.clear_calls += 1;

        if state.fail_on_clear {
            return Err(ServiceError::Rejected {
                service: SERVICE,
                operation: "clear_items",
                message: "Cart service unavailable".to_string(),
            });
        }

        if let Some(cart) = state.carts.get_mut(&user_id) {
            for id in ids {
                cart.remove(id);
            }
        }
        Ok(())
    }
}
