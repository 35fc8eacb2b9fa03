//! Order commands.

use common::{UserId, VariantId};
use serde::{Deserialize, Serialize};

use super::{OrderError, ShippingAddress};

/// One requested line: a variant and how many units of it.
///
/// Carries no price. Prices always come from the inventory snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRequestItem {
    pub variant_id: VariantId,
    pub quantity: u32,
}

impl OrderRequestItem {
    /// Creates a new request item.
    pub fn new(variant_id: impl Into<VariantId>, quantity: u32) -> Self {
        Self {
            variant_id: variant_id.into(),
            quantity,
        }
    }
}

/// Command to place a new order from a cart selection.
#[derive(Debug, Clone)]
pub struct PlaceOrder {
    /// The user placing the order.
    pub user_id: UserId,

    /// Requested variants and quantities.
    pub items: Vec<OrderRequestItem>,

    /// Address captured onto the order.
    pub shipping_address: ShippingAddress,
}

impl PlaceOrder {
    /// Creates a new PlaceOrder command.
    pub fn new(
        user_id: impl Into<UserId>,
        items: Vec<OrderRequestItem>,
        shipping_address: ShippingAddress,
    ) -> Self {
        Self {
            user_id: user_id.into(),
            items,
            shipping_address,
        }
    }

    /// Validates the request and merges repeated variants.
    ///
    /// Returns one item per distinct variant in first-seen order, with the
    /// quantities of repeated variants summed.
    pub fn normalized_items(&self) -> Result<Vec<OrderRequestItem>, OrderError> {
        if self.items.is_empty() {
            return Err(OrderError::EmptyItemList);
        }

        let mut merged: Vec<OrderRequestItem> = Vec::with_capacity(self.items.len());
        for item in &self.items {
            if item.quantity == 0 {
                return Err(OrderError::InvalidQuantity {
                    variant_id: item.variant_id,
                    quantity: item.quantity,
                });
            }
            match merged.iter_mut().find(|m| m.variant_id == item.variant_id) {
                Some(existing) => {
                    existing.quantity = existing.quantity.checked_add(item.quantity).ok_or(
                        OrderError::AmountOverflow {
                            variant_id: item.variant_id,
                        },
                    )?;
                }
                None => merged.push(*item),
            }
        }
        Ok(merged)
    }
}
