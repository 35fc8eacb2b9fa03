//! Inventory service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use common::VariantId;
use domain::{Money, SkuSnapshot};
use serde::{Deserialize, Serialize};

use crate::error::ServiceError;

pub(crate) const SERVICE: &str = "inventory";

/// An item to reserve in (or release back to) inventory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReservationItem {
    /// The variant to reserve.
    pub variant_id: VariantId,
    /// Quantity to reserve.
    pub quantity: u32,
}

/// Pricing and stock operations of the inventory service.
#[async_trait]
pub trait InventoryClient: Send + Sync {
    /// Returns current snapshots for the given variants.
    ///
    /// Unknown or delisted variants are omitted from the result.
    async fn get_sku_snapshots(&self, ids: &[VariantId]) -> Result<Vec<SkuSnapshot>, ServiceError>;

    /// Reserves stock for all items, or for none of them.
    async fn reserve_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError>;

    /// Returns previously reserved stock.
    async fn release_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError>;
}

#[async_trait]
impl<T: InventoryClient + ?Sized> InventoryClient for Arc<T> {
    async fn get_sku_snapshots(&self, ids: &[VariantId]) -> Result<Vec<SkuSnapshot>, ServiceError> {
        (**self).get_sku_snapshots(ids).await
    }

    async fn reserve_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        (**self).reserve_stock(items).await
    }

    async fn release_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        (**self).release_stock(items).await
    }
}

#[derive(Debug, Default)]
struct InMemoryInventoryState {
    skus: HashMap<VariantId, SkuSnapshot>,
    reserved: HashMap<VariantId, u32>,
    snapshot_calls: usize,
    reserve_calls: usize,
    release_calls: usize,
    fail_on_reserve: bool,
    fail_on_release: bool,
    reserve_delay: Option<Duration>,
}

/// In-memory inventory service for testing.
///
/// Reservations move units from available stock to a reserved tally and
/// releases move them back.
#[derive(Debug, Clone, Default)]
pub struct InMemoryInventoryService {
    state: Arc<RwLock<InMemoryInventoryState>>,
}

impl InMemoryInventoryService {
    /// Creates a new in-memory inventory service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces a variant.
    pub fn upsert_sku(&self, snapshot: SkuSnapshot) {
        self.state
            .write()
            .unwrap()
            .skus
            .insert(snapshot.variant_id, snapshot);
    }

    /// Changes the catalog price of a variant.
    pub fn set_price(&self, variant_id: VariantId, price: Money) {
        if let Some(sku) = self.state.write().unwrap().skus.get_mut(&variant_id) {
            sku.unit_price = price;
        }
    }

    /// Configures the service to reject reserve calls.
    pub fn set_fail_on_reserve(&self, fail: bool) {
        self.state.write().unwrap().fail_on_reserve = fail;
    }

    /// Configures the service to reject release calls.
    pub fn set_fail_on_release(&self, fail: bool) {
        self.state.write().unwrap().fail_on_release = fail;
    }

    /// Makes reserve calls sleep before answering.
    pub fn set_reserve_delay(&self, delay: Option<Duration>) {
        self.state.write().unwrap().reserve_delay = delay;
    }

    /// Returns the available stock of a variant.
    pub fn available_stock(&self, variant_id: VariantId) -> Option<u32> {
        self.state
            .read()
            .unwrap()
            .skus
            .get(&variant_id)
            .map(|s| s.available_stock)
    }

    /// Returns the units currently reserved for a variant.
    pub fn reserved_units(&self, variant_id: VariantId) -> u32 {
        self.state
            .read()
            .unwrap()
            .reserved
            .get(&variant_id)
            .copied()
            .unwrap_or(0)
    }

    /// Returns the units currently reserved across all variants.
    pub fn total_reserved(&self) -> u32 {
        self.state.read().unwrap().reserved.values().sum()
    }

    /// Returns how many snapshot queries were made.
    pub fn snapshot_calls(&self) -> usize {
        self.state.read().unwrap().snapshot_calls
    }

    /// Returns how many reserve calls were made.
    pub fn reserve_calls(&self) -> usize {
        self.state.read().unwrap().reserve_calls
    }

    /// Returns how many release calls were made.
    pub fn release_calls(&self) -> usize {
        self.state.read().unwrap().release_calls
    }
}

#[async_trait]
impl InventoryClient for InMemoryInventoryService {
    async fn get_sku_snapshots(&self, ids: &[VariantId]) -> Result<Vec<SkuSnapshot>, ServiceError> {
        let mut state = self.state.write().unwrap();
        state.snapshot_calls += 1;
        Ok(ids
            .iter()
            .filter_map(|id| state.skus.get(id).cloned())
            .collect())
    }

    async fn reserve_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        let delay = {
            let mut state = self.state.write().unwrap();
            state.reserve_calls += 1;
            state.reserve_delay
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.write().unwrap();
        let rejected = |message: String| ServiceError::Rejected {
            service: SERVICE,
            operation: "reserve_stock",
            message,
        };

        if state.fail_on_reserve {
            return Err(rejected("Inventory locked".to_string()));
        }

        for item in items {
            let available = state
                .skus
                .get(&item.variant_id)
                .map(|s| s.available_stock)
                .unwrap_or(0);
            if available < item.quantity {
                return Err(rejected(format!(
                    "Insufficient stock for variant {}",
                    item.variant_id
                )));
            }
        }

        for item in items {
            if let Some(sku) = state.skus.get_mut(&item.variant_id) {
                sku.available_stock -= item.quantity;
            }
            *state.reserved.entry(item.variant_id).or_insert(0) += item.quantity;
        }
        Ok(())
    }

    async fn release_stock(&self, items: &[ReservationItem]) -> Result<(), ServiceError> {
        let mut state = self.state.write().unwrap();
        state.release_calls += 1;

        if state.fail_on_release {
            return Err(ServiceError::Rejected {
                service: SERVICE,
                operation: "release_stock",
                message: "Inventory unavailable".to_string(),
            });
        }

        for item in items {
            let reserved = state.reserved.entry(item.variant_id).or_insert(0);
            let released = item.quantity.min(*reserved);
            *reserved -= released;
            if let Some(sku) = state.skus.get_mut(&item.variant_id) {
                sku.available_stock += released;
            }
        }
        state.reserved.retain(|_, units| *units > 0);
        Ok(())
    }
}
